use arborea::cli::{
    handle_close, handle_compensation, handle_decide, handle_file, handle_get, handle_init,
    handle_list, handle_serve, handle_species_get, handle_species_list, handle_species_search,
    handle_species_seed, handle_visit, Cli, Commands, SpeciesAction,
};
use clap::Parser;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { seed } => handle_init(seed),
        Commands::Species(species) => match species.action {
            SpeciesAction::Seed => handle_species_seed(),
            SpeciesAction::List { json } => handle_species_list(json),
            SpeciesAction::Search { query, limit, json } => {
                handle_species_search(query, limit, json)
            }
            SpeciesAction::Get { name, json } => handle_species_get(name, json),
        },
        Commands::File {
            applicant,
            document,
            role,
            species,
            dbh,
            height,
            request,
            motive,
            address,
            json,
        } => handle_file(
            applicant, document, role, species, dbh, height, request, motive, address, json,
        ),
        Commands::Visit {
            id,
            technician,
            risk,
            observations,
            recommendations,
            json,
        } => handle_visit(id, technician, risk, observations, recommendations, json),
        Commands::Decide {
            id,
            decision,
            motive,
            validity,
            obligations,
            coefficient,
            json,
        } => handle_decide(id, decision, motive, validity, obligations, coefficient, json),
        Commands::Close { id, json } => handle_close(id, json),
        Commands::List {
            status,
            request,
            json,
        } => handle_list(status, request, json),
        Commands::Get { id, json } => handle_get(id, json),
        Commands::Compensation {
            dbh,
            coefficient,
            json,
        } => handle_compensation(dbh, coefficient, json),
        Commands::Serve { addr } => handle_serve(addr),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
