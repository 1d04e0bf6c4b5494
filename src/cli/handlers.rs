use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Utc;

use crate::entity::{
    Applicant, CompensationPlan, Location, NewPermit, Permit, RulingInput, SiteVisit, TreeSnapshot,
};
use crate::error::{ArboreaError, Result};
use crate::store::Store;
use crate::{compensation, seed};

/// Find the project root by looking for .arborea/ or .git/
fn find_project_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(".arborea").exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

fn open_store() -> Result<Store> {
    Store::open(&find_project_root())
}

/// Resolve a CLI argument that may be a numeric id or a tracking number.
fn resolve_id(store: &Store, id: &str) -> Result<i64> {
    match id.parse::<i64>() {
        Ok(id) => Ok(id),
        Err(_) => Ok(store.get_by_tracking_number(id)?.id),
    }
}

fn get_operator() -> Option<String> {
    env::var("USER").ok().filter(|u| !u.is_empty())
}

pub fn handle_init(seed_catalog: bool) -> Result<()> {
    let root = env::current_dir()?;
    let store = Store::init(&root)?;

    println!("Initialized arborea project in {}", root.display());

    if seed_catalog {
        let count = seed::seed_catalog(&store)?;
        println!("  seeded {} species", count);
    }

    Ok(())
}

pub fn handle_species_seed() -> Result<()> {
    let store = open_store()?;
    let count = seed::seed_catalog(&store)?;
    if count == 0 {
        println!("Species catalog already seeded.");
    } else {
        println!("Seeded {} species.", count);
    }
    Ok(())
}

pub fn handle_species_list(json: bool) -> Result<()> {
    let store = open_store()?;
    let species = store.list_species()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&species)?);
    } else if species.is_empty() {
        println!("No species in the catalog. Run `arborea species seed` first.");
    } else {
        println!("Species:\n");
        for s in &species {
            println!(
                "  {:<20} {:<28} [{}] coef {}",
                s.common_name, s.scientific_name, s.category, s.compensation_coefficient
            );
        }
    }
    Ok(())
}

pub fn handle_species_search(query: String, limit: usize, json: bool) -> Result<()> {
    let store = open_store()?;
    let species = store.search_species(&query, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&species)?);
    } else if species.is_empty() {
        println!("No species matching '{}'.", query);
    } else {
        for s in &species {
            println!(
                "  {:<20} {:<28} coef {}",
                s.common_name, s.scientific_name, s.compensation_coefficient
            );
        }
    }
    Ok(())
}

pub fn handle_species_get(name: String, json: bool) -> Result<()> {
    let store = open_store()?;
    let species = store
        .get_species(&name)?
        .ok_or(ArboreaError::SpeciesNotFound(name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&species)?);
    } else {
        println!("{} ({})", species.common_name, species.scientific_name);
        println!("  category:    {}", species.category);
        println!("  coefficient: {}", species.compensation_coefficient);
        println!("  native:      {}", if species.native { "sí" } else { "no" });
        if let Some(desc) = &species.description {
            println!("  {}", desc);
        }
    }
    Ok(())
}

pub fn handle_file(
    applicant: String,
    document: String,
    role: String,
    species: String,
    dbh: Option<f64>,
    height: Option<f64>,
    request: String,
    motive: Option<String>,
    address: Option<String>,
    json: bool,
) -> Result<()> {
    let mut store = open_store()?;

    let new = NewPermit {
        applicant: Applicant {
            name: applicant,
            document_id: document,
            phone: None,
            email: None,
            role: role
                .parse()
                .map_err(|e: String| ArboreaError::validation("role", e))?,
        },
        location: Location {
            address,
            ..Default::default()
        },
        tree: TreeSnapshot {
            species_common: species,
            species_scientific: None,
            species_id: None,
            dbh_cm: dbh,
            height_m: height,
            crown_m: None,
            condition: None,
            initial_risk: None,
        },
        request_type: request
            .parse()
            .map_err(|e: String| ArboreaError::validation("request", e))?,
        motive,
        compensation: CompensationPlan::default(),
        created_by: get_operator(),
    };

    let permit = store.file_request(new)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permit)?);
    } else {
        println!("Filed {} [{}]", permit.tracking_number, permit.status);
        if let Some(n) = permit.compensation.trees_to_plant {
            println!("  compensation: {} replacement tree(s)", n);
        }
    }
    Ok(())
}

pub fn handle_visit(
    id: String,
    technician: String,
    risk: Option<String>,
    observations: Option<String>,
    recommendations: Option<String>,
    json: bool,
) -> Result<()> {
    let mut store = open_store()?;
    let id = resolve_id(&store, &id)?;

    let visit = SiteVisit {
        date: Utc::now(),
        technician,
        final_risk: risk
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| ArboreaError::validation("risk", e))?,
        observations,
        recommendations,
    };
    let permit = store.record_visit(id, visit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permit)?);
    } else {
        println!("Visit recorded on {} [{}]", permit.tracking_number, permit.status);
    }
    Ok(())
}

pub fn handle_decide(
    id: String,
    decision: String,
    motive: Option<String>,
    validity: Option<u32>,
    obligations: Option<String>,
    coefficient: Option<f64>,
    json: bool,
) -> Result<()> {
    let mut store = open_store()?;
    let id = resolve_id(&store, &id)?;

    let input = RulingInput {
        decision,
        denial_motive: motive,
        validity_days: validity,
        obligations,
        coefficient,
    };
    let permit = store.record_decision(id, input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permit)?);
    } else {
        println!("Ruling recorded on {} [{}]", permit.tracking_number, permit.status);
        if let Some(ruling) = &permit.ruling {
            if let Some(expires) = ruling.expires_at {
                println!(
                    "  {} valid until {}",
                    ruling.decision,
                    expires.format("%Y-%m-%d")
                );
            }
        }
    }
    Ok(())
}

pub fn handle_close(id: String, json: bool) -> Result<()> {
    let mut store = open_store()?;
    let id = resolve_id(&store, &id)?;
    let permit = store.close(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permit)?);
    } else {
        println!("Closed {}", permit.tracking_number);
    }
    Ok(())
}

pub fn handle_list(status: Option<String>, request: Option<String>, json: bool) -> Result<()> {
    let store = open_store()?;

    let status = status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: String| ArboreaError::validation("status", e))?;
    let request = request
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: String| ArboreaError::validation("request", e))?;

    let permits = store.list_permits(status, request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permits)?);
    } else if permits.is_empty() {
        println!("No permits found.");
    } else {
        println!("Permits:\n");
        for p in &permits {
            println!(
                "  {}  [{}] {} - {} ({})",
                p.tracking_number, p.status, p.request_type, p.tree.species_common, p.applicant.name
            );
        }
    }
    Ok(())
}

pub fn handle_get(id: String, json: bool) -> Result<()> {
    let store = open_store()?;
    let id = resolve_id(&store, &id)?;
    let permit = store.get_permit(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&permit)?);
    } else {
        print_permit(&permit);
    }
    Ok(())
}

fn print_permit(p: &Permit) {
    println!("{} [{}]", p.tracking_number, p.status);
    println!("  filed:     {}", p.created_at.format("%Y-%m-%d %H:%M"));
    println!("  applicant: {} ({})", p.applicant.name, p.applicant.role);
    println!("  request:   {} - {}", p.request_type, p.tree.species_common);
    if let Some(dbh) = p.tree.dbh_cm {
        println!("  dbh:       {} cm", dbh);
    }
    if let Some(visit) = &p.visit {
        println!(
            "  visit:     {} by {}",
            visit.date.format("%Y-%m-%d"),
            visit.technician
        );
        if let Some(risk) = visit.final_risk {
            println!("  risk:      {}", risk);
        }
    }
    if let Some(ruling) = &p.ruling {
        println!("  ruling:    {}", ruling.decision);
        if let Some(motive) = &ruling.denial_motive {
            println!("  motive:    {}", motive);
        }
        if let Some(expires) = ruling.expires_at {
            println!("  expires:   {}", expires.format("%Y-%m-%d"));
        }
    }
    if let Some(n) = p.compensation.trees_to_plant {
        println!("  compensation: {} replacement tree(s)", n);
    }
}

pub fn handle_compensation(dbh: f64, coefficient: Option<f64>, json: bool) -> Result<()> {
    if dbh <= 0.0 {
        return Err(ArboreaError::validation("dbh", "must be positive"));
    }
    let coefficient = coefficient.unwrap_or(1.0);
    if coefficient <= 0.0 {
        return Err(ArboreaError::validation("coefficient", "must be positive"));
    }

    let trees = compensation::trees_to_plant(dbh, coefficient);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "dbh_cm": dbh,
                "coefficient": coefficient,
                "formula": compensation::FORMULA,
                "trees_to_plant": trees,
            }))?
        );
    } else {
        println!(
            "{} replacement tree(s) for DAP {} cm at coefficient {}",
            trees, dbh, coefficient
        );
    }
    Ok(())
}

pub fn handle_serve(addr: String) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let addr: SocketAddr = addr
        .parse()
        .map_err(|_| ArboreaError::validation("addr", format!("invalid address '{}'", addr)))?;
    let store = open_store()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::api::serve(store, addr))
}
