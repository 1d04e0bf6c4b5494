// src/seed.rs
//
// Reference catalog of tree species common in Colombian municipalities.
// Seeding is idempotent: a catalog that already has entries is left alone.

use tracing::info;

use crate::entity::{Species, SpeciesCategory};
use crate::error::Result;
use crate::store::Store;

type SeedRow = (
    &'static str,        // common name
    &'static str,        // scientific name
    &'static str,        // family
    &'static str,        // crown shape
    u32,                 // avg age (years)
    f64,                 // avg height (m)
    f64,                 // avg DBH (cm)
    f64,                 // avg crown (m)
    SpeciesCategory,     // category
    f64,                 // compensation coefficient
    bool,                // native
    &'static str,        // description
);

const CATALOG: &[SeedRow] = &[
    (
        "Roble",
        "Quercus humboldtii",
        "Fagaceae",
        "Redonda",
        300,
        35.0,
        60.0,
        25.0,
        SpeciesCategory::Nativa,
        1.5,
        true,
        "Árbol noble, muy resistente, especie importante en bosques andinos",
    ),
    (
        "Cedro Rosado",
        "Acrocarpus fraxinifolius",
        "Fabaceae",
        "Piramidal",
        80,
        30.0,
        50.0,
        20.0,
        SpeciesCategory::Nativa,
        1.2,
        true,
        "Árbol maderable, madera de excelente calidad",
    ),
    (
        "Guanacaste",
        "Enterolobium cyclocarpum",
        "Fabaceae",
        "Redonda",
        150,
        25.0,
        80.0,
        35.0,
        SpeciesCategory::Nativa,
        2.0,
        true,
        "Árbol muy grande, frondoso, proporciona buena sombra",
    ),
    (
        "Samán",
        "Albizia saman",
        "Fabaceae",
        "Paraguas",
        100,
        20.0,
        70.0,
        40.0,
        SpeciesCategory::Nativa,
        1.8,
        true,
        "Árbol típico de llanuras, muy resistente",
    ),
    (
        "Laurel de la India",
        "Ficus nitida",
        "Moraceae",
        "Piramidal",
        60,
        18.0,
        40.0,
        15.0,
        SpeciesCategory::Exotica,
        0.8,
        false,
        "Árbol ornamental, usado en jardinería urbana",
    ),
    (
        "Nogal Cafetero",
        "Cordia alliodora",
        "Boraginaceae",
        "Piramidal",
        80,
        25.0,
        45.0,
        18.0,
        SpeciesCategory::Nativa,
        1.3,
        true,
        "Árbol maderable, multipropósito, resistente",
    ),
    (
        "Pino Pátula",
        "Pinus patula",
        "Pinaceae",
        "Piramidal",
        40,
        30.0,
        35.0,
        12.0,
        SpeciesCategory::Exotica,
        0.6,
        false,
        "Conífero plantado para reforestación comercial",
    ),
    (
        "Eucalipto",
        "Eucalyptus globulus",
        "Myrtaceae",
        "Piramidal",
        30,
        35.0,
        40.0,
        10.0,
        SpeciesCategory::Exotica,
        0.5,
        false,
        "Árbol de crecimiento rápido, para producción de madera",
    ),
    (
        "Mango",
        "Mangifera indica",
        "Anacardiaceae",
        "Redonda",
        50,
        15.0,
        50.0,
        20.0,
        SpeciesCategory::Frutales,
        1.0,
        false,
        "Árbol frutal, de valor comercial",
    ),
    (
        "Aguacate",
        "Persea americana",
        "Lauraceae",
        "Redonda",
        40,
        12.0,
        35.0,
        15.0,
        SpeciesCategory::Frutales,
        0.8,
        false,
        "Árbol frutal de importancia comercial en zonas cafeteras",
    ),
    (
        "Cítrico",
        "Citrus aurantium",
        "Rutaceae",
        "Redonda",
        35,
        8.0,
        25.0,
        10.0,
        SpeciesCategory::Frutales,
        0.6,
        false,
        "Árbol frutal para producción comercial",
    ),
    (
        "Guayacán Amarillo",
        "Tabebuia chrysantha",
        "Bignoniaceae",
        "Redonda",
        120,
        18.0,
        55.0,
        22.0,
        SpeciesCategory::Nativa,
        1.8,
        true,
        "Árbol maderable de gran valor, madera muy durable",
    ),
    (
        "Palma de Cera",
        "Ceroxylon quindiuense",
        "Arecaceae",
        "Columnar",
        60,
        40.0,
        30.0,
        5.0,
        SpeciesCategory::Nativa,
        2.0,
        true,
        "Árbol emblemático colombiano, árbol nacional",
    ),
    (
        "Sende",
        "Erythroxylum coca",
        "Erythroxylaceae",
        "Redonda",
        50,
        5.0,
        15.0,
        8.0,
        SpeciesCategory::Nativa,
        0.4,
        true,
        "Árbol pequeño, crecimiento lento",
    ),
    (
        "Comino",
        "Aniba rosaeodora",
        "Lauraceae",
        "Piramidal",
        80,
        20.0,
        40.0,
        12.0,
        SpeciesCategory::Nativa,
        1.4,
        true,
        "Árbol maderable del Amazonas colombiano",
    ),
];

/// Populate the species catalog. Returns the number of species inserted,
/// zero when the catalog was already seeded.
pub fn seed_catalog(store: &Store) -> Result<usize> {
    if store.species_count()? > 0 {
        info!("species catalog already seeded");
        return Ok(0);
    }

    for row in CATALOG {
        store.insert_species(&species_from_row(row))?;
    }
    info!(count = CATALOG.len(), "species catalog seeded");
    Ok(CATALOG.len())
}

fn species_from_row(row: &SeedRow) -> Species {
    let (
        common_name,
        scientific_name,
        family,
        crown_shape,
        avg_age_years,
        avg_height_m,
        avg_dbh_cm,
        avg_crown_m,
        category,
        compensation_coefficient,
        native,
        description,
    ) = *row;
    Species {
        id: 0,
        common_name: common_name.to_string(),
        scientific_name: scientific_name.to_string(),
        family: Some(family.to_string()),
        crown_shape: Some(crown_shape.to_string()),
        avg_age_years: Some(avg_age_years),
        avg_height_m: Some(avg_height_m),
        avg_dbh_cm: Some(avg_dbh_cm),
        avg_crown_m: Some(avg_crown_m),
        category,
        compensation_coefficient,
        native,
        description: Some(description.to_string()),
    }
}
