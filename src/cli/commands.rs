use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "arborea")]
#[command(version, about = "Tree-intervention permits: filing, site visits, rulings, compensation")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new arborea project in the current directory
    Init {
        /// Also seed the species catalog
        #[arg(long)]
        seed: bool,
    },

    /// Manage the species catalog
    Species(SpeciesCommand),

    /// File a new intervention request
    File {
        /// Applicant full name
        #[arg(long)]
        applicant: String,

        /// Applicant identity document
        #[arg(long)]
        document: String,

        /// Applicant role (propietario, tercero, entidad_publica)
        #[arg(long, default_value = "propietario")]
        role: String,

        /// Common name of the tree species
        #[arg(long)]
        species: String,

        /// Trunk diameter at breast height, in cm
        #[arg(long)]
        dbh: Option<f64>,

        /// Tree height in meters
        #[arg(long)]
        height: Option<f64>,

        /// Intervention requested (poda, tala, trasplante, emergencia)
        #[arg(long, default_value = "poda")]
        request: String,

        /// Why the intervention is needed
        #[arg(long)]
        motive: Option<String>,

        /// Street address of the tree
        #[arg(long)]
        address: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a technician's site visit on a permit
    Visit {
        /// Permit id or tracking number
        id: String,

        /// Technician who performed the visit
        #[arg(long)]
        technician: String,

        /// Risk level observed (bajo, medio, alto)
        #[arg(long)]
        risk: Option<String>,

        /// Field observations
        #[arg(long)]
        observations: Option<String>,

        /// Recommended course of action
        #[arg(long)]
        recommendations: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the ruling on a permit
    Decide {
        /// Permit id or tracking number
        id: String,

        /// Ruling (aprobado, condicionado, negado)
        decision: String,

        /// Motive, required when denying
        #[arg(long)]
        motive: Option<String>,

        /// Validity window in days (1-15)
        #[arg(long)]
        validity: Option<u32>,

        /// Conditions attached to the ruling
        #[arg(long)]
        obligations: Option<String>,

        /// Override the compensation coefficient
        #[arg(long)]
        coefficient: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Close a decided permit
    Close {
        /// Permit id or tracking number
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List permits
    List {
        /// Filter by status (radicada, en_visita, dictamen, aprobada, negada, cerrada)
        #[arg(long)]
        status: Option<String>,

        /// Filter by request type (poda, tala, trasplante, emergencia)
        #[arg(long)]
        request: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get a single permit by id or tracking number
    Get {
        /// Permit id or tracking number
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute replacement trees for a given diameter and coefficient
    Compensation {
        /// Trunk diameter at breast height, in cm
        dbh: f64,

        /// Species coefficient (defaults to 1.0)
        #[arg(long)]
        coefficient: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the JSON API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:4661")]
        addr: String,
    },
}

#[derive(Args, Debug)]
pub struct SpeciesCommand {
    #[command(subcommand)]
    pub action: SpeciesAction,
}

#[derive(Subcommand, Debug)]
pub enum SpeciesAction {
    /// Seed the catalog with the reference species list
    Seed,

    /// List all catalog species
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search species by common name
    Search {
        /// Substring to match
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Get one species by exact common name
    Get {
        /// Common name
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
