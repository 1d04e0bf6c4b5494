use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{info, warn};

use crate::compensation;
use crate::entity::{
    format_tracking_number, Applicant, CompensationPlan, Documents, Location, NewPermit, Permit,
    PermitStatus, RequestType, Ruling, RulingDecision, RulingInput, SiteVisit, Species,
    TreeSnapshot, DEFAULT_VALIDITY_DAYS,
};
use crate::error::{ArboreaError, Result};

const ARBOREA_DIR: &str = ".arborea";
const DB_FILE: &str = "arborea.db";

/// SQLite-backed store for the species catalog and permit records.
///
/// Every workflow operation runs as one immediate transaction, so a
/// concurrent writer either serializes behind the busy timeout or fails
/// loudly; it never observes a half-applied operation.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Initialize a new arborea project under `root`.
    pub fn init(root: &Path) -> Result<Self> {
        let dir = root.join(ARBOREA_DIR);

        if dir.exists() {
            return Err(ArboreaError::AlreadyInitialized);
        }

        fs::create_dir_all(&dir)?;
        Self::open_db(dir.join(DB_FILE))
    }

    /// Open an existing arborea project.
    pub fn open(root: &Path) -> Result<Self> {
        let path = root.join(ARBOREA_DIR).join(DB_FILE);

        if !path.exists() {
            return Err(ArboreaError::NotInitialized);
        }

        Self::open_db(path)
    }

    fn open_db(path: PathBuf) -> Result<Self> {
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "foreign_keys", "on")?;

        let store = Self { conn, path };
        store.init_schema()?;
        Ok(store)
    }

    /// Path to the database file.
    pub fn db_path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS species (
                id INTEGER PRIMARY KEY,
                common_name TEXT NOT NULL UNIQUE,
                scientific_name TEXT NOT NULL,
                family TEXT,
                crown_shape TEXT,
                avg_age_years INTEGER,
                avg_height_m REAL,
                avg_dbh_cm REAL,
                avg_crown_m REAL,
                category TEXT NOT NULL,
                compensation_coefficient REAL NOT NULL DEFAULT 1.0,
                native INTEGER NOT NULL DEFAULT 0,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS permits (
                id INTEGER PRIMARY KEY,
                tracking_number TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                applicant_name TEXT NOT NULL,
                applicant_document TEXT NOT NULL,
                applicant_phone TEXT,
                applicant_email TEXT,
                applicant_role TEXT NOT NULL,
                location_address TEXT,
                location_sector TEXT,
                location_lat REAL,
                location_lng REAL,
                cadastral_id TEXT,
                species_common TEXT NOT NULL,
                species_scientific TEXT,
                species_id INTEGER REFERENCES species(id),
                tree_dbh_cm REAL,
                tree_height_m REAL,
                tree_crown_m REAL,
                tree_condition TEXT,
                tree_initial_risk TEXT,
                request_type TEXT NOT NULL,
                motive TEXT,
                visit_date TEXT,
                visit_technician TEXT,
                visit_final_risk TEXT,
                visit_observations TEXT,
                visit_recommendations TEXT,
                ruling_decision TEXT,
                ruling_denial_motive TEXT,
                ruling_validity_days INTEGER,
                ruling_issued_at TEXT,
                ruling_expires_at TEXT,
                ruling_obligations TEXT,
                comp_method TEXT NOT NULL,
                comp_coefficient REAL,
                comp_trees_to_plant INTEGER,
                comp_recommended_species TEXT,
                comp_planting_site TEXT,
                comp_deadline TEXT,
                pdf_permit TEXT,
                pdf_report TEXT,
                pdf_compensation TEXT,
                pdf_combined TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_permits_status ON permits(status);
            CREATE INDEX IF NOT EXISTS idx_permits_created_at ON permits(created_at);

            CREATE TABLE IF NOT EXISTS compensation_audits (
                permit_id INTEGER PRIMARY KEY REFERENCES permits(id),
                dbh_cm REAL NOT NULL,
                coefficient REAL NOT NULL,
                formula TEXT NOT NULL,
                result INTEGER NOT NULL,
                computed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS permit_sequence (
                year INTEGER PRIMARY KEY,
                last_value INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ========================================================================
    // Species catalog
    // ========================================================================

    pub fn insert_species(&self, species: &Species) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO species
             (common_name, scientific_name, family, crown_shape, avg_age_years,
              avg_height_m, avg_dbh_cm, avg_crown_m, category,
              compensation_coefficient, native, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                species.common_name,
                species.scientific_name,
                species.family,
                species.crown_shape,
                species.avg_age_years,
                species.avg_height_m,
                species.avg_dbh_cm,
                species.avg_crown_m,
                species.category.to_string(),
                species.compensation_coefficient,
                species.native,
                species.description,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Exact (case-sensitive) lookup by common name.
    pub fn get_species(&self, common_name: &str) -> Result<Option<Species>> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE common_name = ?1", SPECIES_SELECT),
                [common_name],
                species_from_row,
            )
            .optional()?;
        row.transpose()
    }

    /// Substring search on common name, for pre-filling the filing form.
    pub fn search_species(&self, query: &str, limit: usize) -> Result<Vec<Species>> {
        let pattern = format!("%{}%", query);
        let mut stmt = self.conn.prepare(&format!(
            "{} WHERE common_name LIKE ?1 ORDER BY common_name LIMIT ?2",
            SPECIES_SELECT
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], species_from_row)?;
        rows.map(|r| r?).collect()
    }

    pub fn list_species(&self) -> Result<Vec<Species>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY common_name", SPECIES_SELECT))?;
        let rows = stmt.query_map([], species_from_row)?;
        rows.map(|r| r?).collect()
    }

    pub fn species_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM species", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // Permit workflow
    // ========================================================================

    /// File a new request. Validates required fields, assigns the year-scoped
    /// tracking number atomically, fills tree defaults from the species
    /// catalog, and runs the compensation calculator when the method is
    /// automatic.
    pub fn file_request(&mut self, mut new: NewPermit) -> Result<Permit> {
        new.validate()?;

        // Pre-fill from the catalog when the declared name matches an entry.
        if let Some(species) = self.get_species(&new.tree.species_common)? {
            new.tree.species_id = Some(species.id);
            if new.tree.species_scientific.is_none() {
                new.tree.species_scientific = Some(species.scientific_name.clone());
            }
            if new.compensation.coefficient.is_none() {
                new.compensation.coefficient = Some(species.compensation_coefficient);
            }
        }
        if new.compensation.method == crate::entity::CompensationMethod::Automatic
            && new.compensation.coefficient.is_none()
        {
            new.compensation.coefficient = Some(1.0);
        }

        let audit = if new.compensation.method == crate::entity::CompensationMethod::Automatic {
            compensation::compute(new.tree.dbh_cm, new.compensation.coefficient)
        } else {
            None
        };
        if let Some(ref audit) = audit {
            new.compensation.trees_to_plant = Some(audit.result);
        }

        let now = Utc::now();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Atomic per-year counter: two concurrent filings can never read the
        // same value because the increment happens inside this transaction.
        let year = now.year();
        let seq: u32 = tx.query_row(
            "INSERT INTO permit_sequence (year, last_value) VALUES (?1, 1)
             ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
            [year],
            |row| row.get(0),
        )?;
        let tracking_number = format_tracking_number(year, seq);

        tx.execute(
            "INSERT INTO permits
             (tracking_number, status,
              applicant_name, applicant_document, applicant_phone, applicant_email, applicant_role,
              location_address, location_sector, location_lat, location_lng, cadastral_id,
              species_common, species_scientific, species_id,
              tree_dbh_cm, tree_height_m, tree_crown_m, tree_condition, tree_initial_risk,
              request_type, motive,
              comp_method, comp_coefficient, comp_trees_to_plant,
              comp_recommended_species, comp_planting_site, comp_deadline,
              created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                     ?29, ?30, ?31)",
            params![
                tracking_number,
                PermitStatus::Filed.to_string(),
                new.applicant.name,
                new.applicant.document_id,
                new.applicant.phone,
                new.applicant.email,
                new.applicant.role.to_string(),
                new.location.address,
                new.location.sector,
                new.location.lat,
                new.location.lng,
                new.location.cadastral_id,
                new.tree.species_common,
                new.tree.species_scientific,
                new.tree.species_id,
                new.tree.dbh_cm,
                new.tree.height_m,
                new.tree.crown_m,
                new.tree.condition.map(|c| c.to_string()),
                new.tree.initial_risk.map(|r| r.to_string()),
                new.request_type.to_string(),
                new.motive,
                new.compensation.method.to_string(),
                new.compensation.coefficient,
                new.compensation.trees_to_plant,
                new.compensation.recommended_species,
                new.compensation.planting_site,
                new.compensation.deadline,
                new.created_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(audit) = audit {
            tx.execute(
                "INSERT INTO compensation_audits
                 (permit_id, dbh_cm, coefficient, formula, result, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    audit.dbh_cm,
                    audit.coefficient,
                    audit.formula,
                    audit.result,
                    audit.computed_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        info!(tracking_number, id, "permit filed");
        self.get_permit(id)
    }

    pub fn get_permit(&self, id: i64) -> Result<Permit> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE p.id = ?1", PERMIT_SELECT),
                [id],
                permit_from_row,
            )
            .optional()?;
        match row {
            Some(permit) => permit,
            None => Err(ArboreaError::PermitNotFound(id.to_string())),
        }
    }

    pub fn get_by_tracking_number(&self, tracking_number: &str) -> Result<Permit> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE p.tracking_number = ?1", PERMIT_SELECT),
                [tracking_number],
                permit_from_row,
            )
            .optional()?;
        match row {
            Some(permit) => permit,
            None => Err(ArboreaError::PermitNotFound(tracking_number.to_string())),
        }
    }

    /// List permits, newest first, optionally filtered by status and
    /// request type.
    pub fn list_permits(
        &self,
        status: Option<PermitStatus>,
        request_type: Option<RequestType>,
    ) -> Result<Vec<Permit>> {
        let mut sql = format!("{} WHERE 1=1", PERMIT_SELECT);
        let mut args: Vec<String> = Vec::new();
        if let Some(status) = status {
            args.push(status.to_string());
            sql.push_str(&format!(" AND p.status = ?{}", args.len()));
        }
        if let Some(request_type) = request_type {
            args.push(request_type.to_string());
            sql.push_str(&format!(" AND p.request_type = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY p.created_at DESC, p.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), permit_from_row)?;
        rows.map(|r| r?).collect()
    }

    /// Record the technician's site visit. Allowed from Radicada, and again
    /// from En visita: a re-visit overwrites the previous one.
    pub fn record_visit(&mut self, id: i64, visit: SiteVisit) -> Result<Permit> {
        if visit.technician.trim().is_empty() {
            return Err(ArboreaError::validation("technician", "must not be empty"));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = permit_status(&tx, id)?;
        check_transition(status, PermitStatus::InVisit)?;

        tx.execute(
            "UPDATE permits SET
               status = ?1, visit_date = ?2, visit_technician = ?3,
               visit_final_risk = ?4, visit_observations = ?5,
               visit_recommendations = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                PermitStatus::InVisit.to_string(),
                visit.date.to_rfc3339(),
                visit.technician,
                visit.final_risk.map(|r| r.to_string()),
                visit.observations,
                visit.recommendations,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        tx.commit()?;
        info!(id, "site visit recorded");
        self.get_permit(id)
    }

    /// Record the ruling. Requires a prior site visit; a decision on a
    /// freshly filed or already decided permit is an illegal transition.
    pub fn record_decision(&mut self, id: i64, input: RulingInput) -> Result<Permit> {
        let decision = input.parse()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = permit_status(&tx, id)?;
        if !status.ruling_allowed() {
            warn!(id, from = %status, "ruling rejected");
            return Err(ArboreaError::IllegalTransition {
                from: status.to_string(),
                to: PermitStatus::Assessment.to_string(),
            });
        }

        let next = match decision {
            // A conditioned permit is still granted: it gets a validity window.
            RulingDecision::Approved | RulingDecision::Conditioned => PermitStatus::Approved,
            RulingDecision::Denied => PermitStatus::Denied,
        };

        let mut ruling = Ruling {
            decision,
            denial_motive: input.denial_motive.clone(),
            validity_days: input.validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS),
            issued_at: None,
            expires_at: None,
            obligations: input.obligations.clone(),
        };
        if next == PermitStatus::Approved {
            ruling.issue(Utc::now());
        }

        tx.execute(
            "UPDATE permits SET
               status = ?1, ruling_decision = ?2, ruling_denial_motive = ?3,
               ruling_validity_days = ?4, ruling_issued_at = ?5,
               ruling_expires_at = ?6, ruling_obligations = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                next.to_string(),
                ruling.decision.to_string(),
                ruling.denial_motive,
                ruling.validity_days,
                ruling.issued_at.map(|d| d.to_rfc3339()),
                ruling.expires_at.map(|d| d.to_rfc3339()),
                ruling.obligations,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;

        // Recalculate compensation when the ruling overrides the coefficient.
        if let Some(coefficient) = input.coefficient {
            let (method, dbh): (String, Option<f64>) = tx.query_row(
                "SELECT comp_method, tree_dbh_cm FROM permits WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if method == crate::entity::CompensationMethod::Automatic.to_string() {
                if let Some(audit) = compensation::compute(dbh, Some(coefficient)) {
                    tx.execute(
                        "UPDATE permits SET comp_coefficient = ?1, comp_trees_to_plant = ?2
                         WHERE id = ?3",
                        params![audit.coefficient, audit.result, id],
                    )?;
                    tx.execute(
                        "INSERT OR REPLACE INTO compensation_audits
                         (permit_id, dbh_cm, coefficient, formula, result, computed_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            id,
                            audit.dbh_cm,
                            audit.coefficient,
                            audit.formula,
                            audit.result,
                            audit.computed_at.to_rfc3339(),
                        ],
                    )?;
                }
            }
        }

        tx.commit()?;
        info!(id, %decision, "ruling recorded");
        self.get_permit(id)
    }

    /// Close a decided permit. No side effects beyond the status change.
    pub fn close(&mut self, id: i64) -> Result<Permit> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = permit_status(&tx, id)?;
        check_transition(status, PermitStatus::Closed)?;

        tx.execute(
            "UPDATE permits SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                PermitStatus::Closed.to_string(),
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        tx.commit()?;
        info!(id, "permit closed");
        self.get_permit(id)
    }

    /// Attach generated-document path references. Written by the external
    /// document generator; only fields that are `Some` are updated. Closed
    /// records are immutable.
    pub fn attach_documents(&mut self, id: i64, documents: &Documents) -> Result<Permit> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = permit_status(&tx, id)?;
        if status == PermitStatus::Closed {
            return Err(ArboreaError::IllegalTransition {
                from: status.to_string(),
                to: status.to_string(),
            });
        }

        tx.execute(
            "UPDATE permits SET
               pdf_permit = COALESCE(?1, pdf_permit),
               pdf_report = COALESCE(?2, pdf_report),
               pdf_compensation = COALESCE(?3, pdf_compensation),
               pdf_combined = COALESCE(?4, pdf_combined),
               updated_at = ?5
             WHERE id = ?6",
            params![
                documents.permit_pdf,
                documents.report_pdf,
                documents.compensation_pdf,
                documents.combined_pdf,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        tx.commit()?;
        self.get_permit(id)
    }
}

fn check_transition(from: PermitStatus, to: PermitStatus) -> Result<()> {
    if from.can_transition(to) {
        Ok(())
    } else {
        warn!(%from, %to, "transition rejected");
        Err(ArboreaError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn permit_status(conn: &Connection, id: i64) -> Result<PermitStatus> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM permits WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    match status {
        Some(s) => s
            .parse()
            .map_err(|e: String| ArboreaError::Storage(e)),
        None => Err(ArboreaError::PermitNotFound(id.to_string())),
    }
}

const SPECIES_SELECT: &str = "SELECT id, common_name, scientific_name, family, crown_shape,
        avg_age_years, avg_height_m, avg_dbh_cm, avg_crown_m, category,
        compensation_coefficient, native, description
 FROM species";

fn species_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Species>> {
    let category: String = row.get(9)?;
    Ok((|| {
        Ok(Species {
            id: row.get(0)?,
            common_name: row.get(1)?,
            scientific_name: row.get(2)?,
            family: row.get(3)?,
            crown_shape: row.get(4)?,
            avg_age_years: row.get(5)?,
            avg_height_m: row.get(6)?,
            avg_dbh_cm: row.get(7)?,
            avg_crown_m: row.get(8)?,
            category: category
                .parse()
                .map_err(|e: String| ArboreaError::Storage(e))?,
            compensation_coefficient: row.get(10)?,
            native: row.get(11)?,
            description: row.get(12)?,
        })
    })())
}

const PERMIT_SELECT: &str = "SELECT p.id, p.tracking_number, p.status,
        p.applicant_name, p.applicant_document, p.applicant_phone, p.applicant_email, p.applicant_role,
        p.location_address, p.location_sector, p.location_lat, p.location_lng, p.cadastral_id,
        p.species_common, p.species_scientific, p.species_id,
        p.tree_dbh_cm, p.tree_height_m, p.tree_crown_m, p.tree_condition, p.tree_initial_risk,
        p.request_type, p.motive,
        p.visit_date, p.visit_technician, p.visit_final_risk, p.visit_observations, p.visit_recommendations,
        p.ruling_decision, p.ruling_denial_motive, p.ruling_validity_days,
        p.ruling_issued_at, p.ruling_expires_at, p.ruling_obligations,
        p.comp_method, p.comp_coefficient, p.comp_trees_to_plant,
        p.comp_recommended_species, p.comp_planting_site, p.comp_deadline,
        p.pdf_permit, p.pdf_report, p.pdf_compensation, p.pdf_combined,
        p.created_by, p.created_at, p.updated_at,
        a.dbh_cm, a.coefficient, a.formula, a.result, a.computed_at
 FROM permits p
 LEFT JOIN compensation_audits a ON a.permit_id = p.id";

fn permit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Permit>> {
    // Pull raw values in the closure; enum/date parsing happens outside
    // rusqlite's error type.
    let status: String = row.get("status")?;
    let role: String = row.get("applicant_role")?;
    let condition: Option<String> = row.get("tree_condition")?;
    let initial_risk: Option<String> = row.get("tree_initial_risk")?;
    let request_type: String = row.get("request_type")?;
    let visit_date: Option<String> = row.get("visit_date")?;
    let visit_technician: Option<String> = row.get("visit_technician")?;
    let visit_final_risk: Option<String> = row.get("visit_final_risk")?;
    let ruling_decision: Option<String> = row.get("ruling_decision")?;
    let ruling_issued_at: Option<String> = row.get("ruling_issued_at")?;
    let ruling_expires_at: Option<String> = row.get("ruling_expires_at")?;
    let comp_method: String = row.get("comp_method")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let audit_computed_at: Option<String> = row.get("computed_at")?;

    let applicant = Applicant {
        name: row.get("applicant_name")?,
        document_id: row.get("applicant_document")?,
        phone: row.get("applicant_phone")?,
        email: row.get("applicant_email")?,
        role: role.parse().unwrap_or_default(),
    };
    let location = Location {
        address: row.get("location_address")?,
        sector: row.get("location_sector")?,
        lat: row.get("location_lat")?,
        lng: row.get("location_lng")?,
        cadastral_id: row.get("cadastral_id")?,
    };
    let tree = TreeSnapshot {
        species_common: row.get("species_common")?,
        species_scientific: row.get("species_scientific")?,
        species_id: row.get("species_id")?,
        dbh_cm: row.get("tree_dbh_cm")?,
        height_m: row.get("tree_height_m")?,
        crown_m: row.get("tree_crown_m")?,
        condition: condition.and_then(|c| c.parse().ok()),
        initial_risk: initial_risk.and_then(|r| r.parse().ok()),
    };

    let id: i64 = row.get("id")?;
    let tracking_number: String = row.get("tracking_number")?;
    let motive: Option<String> = row.get("motive")?;
    let visit_observations: Option<String> = row.get("visit_observations")?;
    let visit_recommendations: Option<String> = row.get("visit_recommendations")?;
    let ruling_denial_motive: Option<String> = row.get("ruling_denial_motive")?;
    let ruling_validity_days: Option<u32> = row.get("ruling_validity_days")?;
    let ruling_obligations: Option<String> = row.get("ruling_obligations")?;
    let comp_coefficient: Option<f64> = row.get("comp_coefficient")?;
    let comp_trees: Option<u32> = row.get("comp_trees_to_plant")?;
    let comp_species: Option<String> = row.get("comp_recommended_species")?;
    let comp_site: Option<String> = row.get("comp_planting_site")?;
    let comp_deadline: Option<String> = row.get("comp_deadline")?;
    let documents = Documents {
        permit_pdf: row.get("pdf_permit")?,
        report_pdf: row.get("pdf_report")?,
        compensation_pdf: row.get("pdf_compensation")?,
        combined_pdf: row.get("pdf_combined")?,
    };
    let created_by: Option<String> = row.get("created_by")?;
    let audit_dbh: Option<f64> = row.get("dbh_cm")?;
    let audit_coefficient: Option<f64> = row.get("coefficient")?;
    let audit_formula: Option<String> = row.get("formula")?;
    let audit_result: Option<u32> = row.get("result")?;

    Ok((move || {
        let status: PermitStatus = status
            .parse()
            .map_err(|e: String| ArboreaError::Storage(e))?;
        let request_type: RequestType = request_type
            .parse()
            .map_err(|e: String| ArboreaError::Storage(e))?;

        let visit = match (visit_date, visit_technician) {
            (Some(date), Some(technician)) => Some(SiteVisit {
                date: parse_utc(&date)?,
                technician,
                final_risk: visit_final_risk.and_then(|r| r.parse().ok()),
                observations: visit_observations,
                recommendations: visit_recommendations,
            }),
            _ => None,
        };

        let ruling = match ruling_decision {
            Some(decision) => Some(Ruling {
                decision: decision
                    .parse()
                    .map_err(|e: String| ArboreaError::Storage(e))?,
                denial_motive: ruling_denial_motive,
                validity_days: ruling_validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS),
                issued_at: ruling_issued_at.as_deref().map(parse_utc).transpose()?,
                expires_at: ruling_expires_at.as_deref().map(parse_utc).transpose()?,
                obligations: ruling_obligations,
            }),
            None => None,
        };

        let audit = match (audit_dbh, audit_coefficient, audit_formula, audit_result) {
            (Some(dbh_cm), Some(coefficient), Some(formula), Some(result)) => {
                Some(crate::compensation::CompensationAudit {
                    dbh_cm,
                    coefficient,
                    formula,
                    result,
                    computed_at: audit_computed_at
                        .as_deref()
                        .map(parse_utc)
                        .transpose()?
                        .unwrap_or_else(Utc::now),
                })
            }
            _ => None,
        };

        let compensation = CompensationPlan {
            method: comp_method
                .parse()
                .map_err(|e: String| ArboreaError::Storage(e))?,
            coefficient: comp_coefficient,
            trees_to_plant: comp_trees,
            recommended_species: comp_species,
            planting_site: comp_site,
            deadline: comp_deadline,
            audit,
        };

        Ok(Permit {
            id,
            tracking_number,
            status,
            applicant,
            location,
            tree,
            request_type,
            motive,
            visit,
            ruling,
            compensation,
            documents,
            created_by,
            created_at: parse_utc(&created_at)?,
            updated_at: parse_utc(&updated_at)?,
        })
    })())
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ArboreaError::Storage(format!("bad timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        ApplicantRole, CompensationMethod, CompensationPlan, RiskLevel, SpeciesCategory,
    };
    use tempfile::TempDir;

    fn test_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::init(dir.path()).unwrap();
        (dir, store)
    }

    fn roble() -> Species {
        Species {
            id: 0,
            common_name: "Roble".to_string(),
            scientific_name: "Quercus humboldtii".to_string(),
            family: Some("Fagaceae".to_string()),
            crown_shape: None,
            avg_age_years: None,
            avg_height_m: None,
            avg_dbh_cm: None,
            avg_crown_m: None,
            category: SpeciesCategory::Nativa,
            compensation_coefficient: 2.0,
            native: true,
            description: None,
        }
    }

    fn new_permit(species_common: &str, dbh_cm: Option<f64>) -> NewPermit {
        NewPermit {
            applicant: Applicant {
                name: "María Rodríguez".to_string(),
                document_id: "52.846.113".to_string(),
                phone: Some("3104567890".to_string()),
                email: None,
                role: ApplicantRole::Owner,
            },
            location: Location {
                address: Some("Calle 10 # 4-25".to_string()),
                sector: Some("Centro".to_string()),
                lat: None,
                lng: None,
                cadastral_id: None,
            },
            tree: TreeSnapshot {
                species_common: species_common.to_string(),
                species_scientific: None,
                species_id: None,
                dbh_cm,
                height_m: Some(12.0),
                crown_m: None,
                condition: None,
                initial_risk: None,
            },
            request_type: RequestType::Felling,
            motive: Some("Riesgo de volcamiento".to_string()),
            compensation: CompensationPlan::default(),
            created_by: None,
        }
    }

    fn visit() -> SiteVisit {
        SiteVisit {
            date: Utc::now(),
            technician: "Ing. Torres".to_string(),
            final_risk: Some(RiskLevel::High),
            observations: Some("Raíces expuestas".to_string()),
            recommendations: None,
        }
    }

    fn approve() -> RulingInput {
        RulingInput {
            decision: "Aprobado".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_init_creates_project_dir() {
        let dir = TempDir::new().unwrap();
        let store = Store::init(dir.path()).unwrap();
        assert!(dir.path().join(ARBOREA_DIR).join(DB_FILE).exists());
        assert!(store.db_path().exists());
    }

    #[test]
    fn test_init_twice_fails() {
        let (dir, _store) = test_store();
        assert!(matches!(
            Store::init(dir.path()),
            Err(ArboreaError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_open_without_init_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Store::open(dir.path()),
            Err(ArboreaError::NotInitialized)
        ));
    }

    #[test]
    fn test_file_assigns_sequential_tracking_numbers() {
        let (_dir, mut store) = test_store();
        let year = Utc::now().year();

        let first = store.file_request(new_permit("Roble", Some(45.0))).unwrap();
        let second = store.file_request(new_permit("Mango", None)).unwrap();

        assert_eq!(first.tracking_number, format!("AR-{}-00001", year));
        assert_eq!(second.tracking_number, format!("AR-{}-00002", year));
        assert_eq!(first.status, PermitStatus::Filed);
    }

    #[test]
    fn test_file_validates_required_fields() {
        let (_dir, mut store) = test_store();
        let mut p = new_permit("Roble", None);
        p.applicant.name = "  ".to_string();
        assert!(matches!(
            store.file_request(p),
            Err(ArboreaError::Validation { .. })
        ));
    }

    #[test]
    fn test_file_prefills_from_catalog_and_computes_compensation() {
        let (_dir, mut store) = test_store();
        store.insert_species(&roble()).unwrap();

        let permit = store.file_request(new_permit("Roble", Some(45.0))).unwrap();

        assert!(permit.tree.species_id.is_some());
        assert_eq!(
            permit.tree.species_scientific.as_deref(),
            Some("Quercus humboldtii")
        );
        // ceil((45 / 10) * 2.0) = 9
        assert_eq!(permit.compensation.coefficient, Some(2.0));
        assert_eq!(permit.compensation.trees_to_plant, Some(9));
        let audit = permit.compensation.audit.unwrap();
        assert_eq!(audit.result, 9);
        assert_eq!(audit.dbh_cm, 45.0);
    }

    #[test]
    fn test_file_unknown_species_defaults_coefficient() {
        let (_dir, mut store) = test_store();
        let permit = store
            .file_request(new_permit("Matarratón", Some(20.0)))
            .unwrap();
        assert_eq!(permit.tree.species_id, None);
        assert_eq!(permit.compensation.coefficient, Some(1.0));
        assert_eq!(permit.compensation.trees_to_plant, Some(2));
    }

    #[test]
    fn test_file_manual_method_skips_calculator() {
        let (_dir, mut store) = test_store();
        let mut p = new_permit("Roble", Some(45.0));
        p.compensation.method = CompensationMethod::Manual;
        p.compensation.trees_to_plant = Some(3);

        let permit = store.file_request(p).unwrap();
        assert_eq!(permit.compensation.trees_to_plant, Some(3));
        assert!(permit.compensation.audit.is_none());
    }

    #[test]
    fn test_full_lifecycle_approved() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", Some(45.0))).unwrap();

        let permit = store.record_visit(permit.id, visit()).unwrap();
        assert_eq!(permit.status, PermitStatus::InVisit);
        assert_eq!(permit.visit.as_ref().unwrap().technician, "Ing. Torres");

        let permit = store.record_decision(permit.id, approve()).unwrap();
        assert_eq!(permit.status, PermitStatus::Approved);
        let ruling = permit.ruling.as_ref().unwrap();
        assert_eq!(ruling.decision, RulingDecision::Approved);
        let issued = ruling.issued_at.unwrap();
        assert_eq!(
            ruling.expires_at.unwrap(),
            issued + chrono::Duration::days(15)
        );

        let permit = store.close(permit.id).unwrap();
        assert_eq!(permit.status, PermitStatus::Closed);
    }

    #[test]
    fn test_denied_lifecycle() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();
        store.record_visit(permit.id, visit()).unwrap();

        let input = RulingInput {
            decision: "Negado".to_string(),
            denial_motive: Some("Especie protegida".to_string()),
            ..Default::default()
        };
        let permit = store.record_decision(permit.id, input).unwrap();
        assert_eq!(permit.status, PermitStatus::Denied);
        assert!(permit.ruling.as_ref().unwrap().issued_at.is_none());

        let permit = store.close(permit.id).unwrap();
        assert_eq!(permit.status, PermitStatus::Closed);
    }

    #[test]
    fn test_conditioned_ruling_grants_permit() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();
        store.record_visit(permit.id, visit()).unwrap();

        let input = RulingInput {
            decision: "Condicionado".to_string(),
            validity_days: Some(10),
            obligations: Some("Poda supervisada".to_string()),
            ..Default::default()
        };
        let permit = store.record_decision(permit.id, input).unwrap();
        assert_eq!(permit.status, PermitStatus::Approved);
        let ruling = permit.ruling.as_ref().unwrap();
        assert_eq!(ruling.decision, RulingDecision::Conditioned);
        assert_eq!(ruling.validity_days, 10);
        assert_eq!(
            ruling.expires_at.unwrap(),
            ruling.issued_at.unwrap() + chrono::Duration::days(10)
        );
    }

    #[test]
    fn test_decision_without_visit_rejected() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();
        assert!(matches!(
            store.record_decision(permit.id, approve()),
            Err(ArboreaError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_revisit_overwrites_previous() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();
        store.record_visit(permit.id, visit()).unwrap();

        let mut second = visit();
        second.technician = "Ing. Pardo".to_string();
        second.final_risk = Some(RiskLevel::Low);
        let permit = store.record_visit(permit.id, second).unwrap();

        let v = permit.visit.as_ref().unwrap();
        assert_eq!(v.technician, "Ing. Pardo");
        assert_eq!(v.final_risk, Some(RiskLevel::Low));
    }

    #[test]
    fn test_closed_record_is_immutable() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();
        store.record_visit(permit.id, visit()).unwrap();
        store.record_decision(permit.id, approve()).unwrap();
        let permit = store.close(permit.id).unwrap();

        assert!(store.record_visit(permit.id, visit()).is_err());
        assert!(store.record_decision(permit.id, approve()).is_err());
        assert!(store.close(permit.id).is_err());
        let docs = Documents {
            permit_pdf: Some("permiso.pdf".to_string()),
            ..Default::default()
        };
        assert!(store.attach_documents(permit.id, &docs).is_err());
    }

    #[test]
    fn test_decision_coefficient_override_recomputes() {
        let (_dir, mut store) = test_store();
        store.insert_species(&roble()).unwrap();
        let permit = store.file_request(new_permit("Roble", Some(45.0))).unwrap();
        assert_eq!(permit.compensation.trees_to_plant, Some(9));
        store.record_visit(permit.id, visit()).unwrap();

        let input = RulingInput {
            decision: "Aprobado".to_string(),
            coefficient: Some(1.0),
            ..Default::default()
        };
        let permit = store.record_decision(permit.id, input).unwrap();
        // ceil((45 / 10) * 1.0) = 5
        assert_eq!(permit.compensation.coefficient, Some(1.0));
        assert_eq!(permit.compensation.trees_to_plant, Some(5));
        assert_eq!(permit.compensation.audit.unwrap().result, 5);
    }

    #[test]
    fn test_attach_documents_merges() {
        let (_dir, mut store) = test_store();
        let permit = store.file_request(new_permit("Roble", None)).unwrap();

        let permit = store
            .attach_documents(
                permit.id,
                &Documents {
                    permit_pdf: Some("permiso.pdf".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let permit = store
            .attach_documents(
                permit.id,
                &Documents {
                    report_pdf: Some("informe.pdf".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(permit.documents.permit_pdf.as_deref(), Some("permiso.pdf"));
        assert_eq!(permit.documents.report_pdf.as_deref(), Some("informe.pdf"));
    }

    #[test]
    fn test_get_by_tracking_number() {
        let (_dir, mut store) = test_store();
        let filed = store.file_request(new_permit("Roble", None)).unwrap();
        let found = store.get_by_tracking_number(&filed.tracking_number).unwrap();
        assert_eq!(found.id, filed.id);
        assert!(store.get_by_tracking_number("AR-1999-00001").is_err());
    }

    #[test]
    fn test_list_permits_filters() {
        let (_dir, mut store) = test_store();
        let a = store.file_request(new_permit("Roble", None)).unwrap();
        let mut pruning = new_permit("Mango", None);
        pruning.request_type = RequestType::Pruning;
        store.file_request(pruning).unwrap();
        store.record_visit(a.id, visit()).unwrap();

        let all = store.list_permits(None, None).unwrap();
        assert_eq!(all.len(), 2);

        let in_visit = store
            .list_permits(Some(PermitStatus::InVisit), None)
            .unwrap();
        assert_eq!(in_visit.len(), 1);
        assert_eq!(in_visit[0].id, a.id);

        let felling = store
            .list_permits(None, Some(RequestType::Felling))
            .unwrap();
        assert_eq!(felling.len(), 1);
    }

    #[test]
    fn test_species_search() {
        let (_dir, store) = test_store();
        store.insert_species(&roble()).unwrap();
        let mut other = roble();
        other.common_name = "Roble Australiano".to_string();
        other.scientific_name = "Grevillea robusta".to_string();
        store.insert_species(&other).unwrap();

        assert_eq!(store.species_count().unwrap(), 2);
        assert_eq!(store.search_species("Roble", 10).unwrap().len(), 2);
        assert_eq!(store.search_species("zzz", 10).unwrap().len(), 0);
        assert!(store.get_species("Roble").unwrap().is_some());
        assert!(store.get_species("Ceiba").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_filing_yields_unique_tracking_numbers() {
        let dir = TempDir::new().unwrap();
        Store::init(dir.path()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let root = dir.path().to_path_buf();
            handles.push(std::thread::spawn(move || {
                let mut store = Store::open(&root).unwrap();
                let mut numbers = Vec::new();
                for _ in 0..5 {
                    let permit = store.file_request(new_permit("Roble", None)).unwrap();
                    numbers.push(permit.tracking_number);
                }
                numbers
            }));
        }

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(all.len(), 40);
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 40, "tracking numbers must be unique");
    }
}
