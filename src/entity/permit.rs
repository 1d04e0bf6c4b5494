// src/entity/permit.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::compensation::CompensationAudit;
use crate::error::{ArboreaError, Result};

/// Longest validity window a permit may be granted, in days.
pub const MAX_VALIDITY_DAYS: u32 = 15;
pub const DEFAULT_VALIDITY_DAYS: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    #[default]
    Filed,
    InVisit,
    Assessment,
    Approved,
    Denied,
    Closed,
}

impl PermitStatus {
    /// Explicit transition table. Anything not listed here is illegal,
    /// including every mutation of a closed record.
    pub fn can_transition(self, next: PermitStatus) -> bool {
        use PermitStatus::*;
        matches!(
            (self, next),
            (Filed, InVisit)
                | (InVisit, InVisit)
                | (InVisit, Assessment)
                | (Assessment, Approved)
                | (Assessment, Denied)
                | (Approved, Closed)
                | (Denied, Closed)
        )
    }

    /// A ruling may only be recorded once a site visit exists.
    pub fn ruling_allowed(self) -> bool {
        matches!(self, PermitStatus::InVisit | PermitStatus::Assessment)
    }

    pub fn is_terminal_decision(self) -> bool {
        matches!(self, PermitStatus::Approved | PermitStatus::Denied)
    }
}

impl std::fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermitStatus::Filed => write!(f, "Radicada"),
            PermitStatus::InVisit => write!(f, "En visita"),
            PermitStatus::Assessment => write!(f, "Dictamen"),
            PermitStatus::Approved => write!(f, "Aprobada"),
            PermitStatus::Denied => write!(f, "Negada"),
            PermitStatus::Closed => write!(f, "Cerrada"),
        }
    }
}

impl std::str::FromStr for PermitStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', " ").as_str() {
            "radicada" | "filed" => Ok(PermitStatus::Filed),
            "en visita" | "in visit" => Ok(PermitStatus::InVisit),
            "dictamen" | "assessment" => Ok(PermitStatus::Assessment),
            "aprobada" | "approved" => Ok(PermitStatus::Approved),
            "negada" | "denied" => Ok(PermitStatus::Denied),
            "cerrada" | "closed" => Ok(PermitStatus::Closed),
            _ => Err(format!("Invalid permit status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Pruning,
    Felling,
    Transplant,
    Emergency,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::Pruning => write!(f, "Poda"),
            RequestType::Felling => write!(f, "Tala"),
            RequestType::Transplant => write!(f, "Trasplante"),
            RequestType::Emergency => write!(f, "Emergencia"),
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "poda" | "pruning" => Ok(RequestType::Pruning),
            "tala" | "felling" => Ok(RequestType::Felling),
            "trasplante" | "transplant" => Ok(RequestType::Transplant),
            "emergencia" | "emergency" => Ok(RequestType::Emergency),
            _ => Err(format!("Invalid request type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulingDecision {
    Approved,
    Conditioned,
    Denied,
}

impl std::fmt::Display for RulingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RulingDecision::Approved => write!(f, "Aprobado"),
            RulingDecision::Conditioned => write!(f, "Condicionado"),
            RulingDecision::Denied => write!(f, "Negado"),
        }
    }
}

impl std::str::FromStr for RulingDecision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aprobado" | "approved" => Ok(RulingDecision::Approved),
            "condicionado" | "conditioned" => Ok(RulingDecision::Conditioned),
            "negado" | "denied" => Ok(RulingDecision::Denied),
            _ => Err(format!("Invalid ruling decision: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Bajo"),
            RiskLevel::Medium => write!(f, "Medio"),
            RiskLevel::High => write!(f, "Alto"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bajo" | "low" => Ok(RiskLevel::Low),
            "medio" | "medium" => Ok(RiskLevel::Medium),
            "alto" | "high" => Ok(RiskLevel::High),
            _ => Err(format!("Invalid risk level: {}", s)),
        }
    }
}

/// Phytosanitary condition observed on the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Good => write!(f, "Bueno"),
            Condition::Fair => write!(f, "Regular"),
            Condition::Poor => write!(f, "Malo"),
        }
    }
}

impl std::str::FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bueno" | "good" => Ok(Condition::Good),
            "regular" | "fair" => Ok(Condition::Fair),
            "malo" | "poor" => Ok(Condition::Poor),
            _ => Err(format!("Invalid condition: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantRole {
    #[default]
    Owner,
    ThirdParty,
    PublicEntity,
}

impl std::fmt::Display for ApplicantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicantRole::Owner => write!(f, "Propietario"),
            ApplicantRole::ThirdParty => write!(f, "Tercero"),
            ApplicantRole::PublicEntity => write!(f, "Entidad pública"),
        }
    }
}

impl std::str::FromStr for ApplicantRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', " ").as_str() {
            "propietario" | "owner" => Ok(ApplicantRole::Owner),
            "tercero" | "third party" => Ok(ApplicantRole::ThirdParty),
            "entidad pública" | "entidad publica" | "public entity" => {
                Ok(ApplicantRole::PublicEntity)
            }
            _ => Err(format!("Invalid applicant role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompensationMethod {
    #[default]
    Automatic,
    Manual,
}

impl std::fmt::Display for CompensationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompensationMethod::Automatic => write!(f, "Automático"),
            CompensationMethod::Manual => write!(f, "Manual"),
        }
    }
}

impl std::str::FromStr for CompensationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "automático" | "automatico" | "automatic" => Ok(CompensationMethod::Automatic),
            "manual" => Ok(CompensationMethod::Manual),
            _ => Err(format!("Invalid compensation method: {}", s)),
        }
    }
}

/// Who is asking for the intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Applicant {
    pub name: String,
    pub document_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub role: ApplicantRole,
}

/// Where the tree stands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    pub address: Option<String>,
    pub sector: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub cadastral_id: Option<String>,
}

/// Measurements and condition of the tree as declared at filing time.
/// `species_id` links to the catalog when the declared name matched an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub species_common: String,
    pub species_scientific: Option<String>,
    pub species_id: Option<i64>,
    pub dbh_cm: Option<f64>,
    pub height_m: Option<f64>,
    pub crown_m: Option<f64>,
    pub condition: Option<Condition>,
    pub initial_risk: Option<RiskLevel>,
}

/// Outcome of the technician's site visit. Overwritten wholesale on
/// re-visit; no history is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteVisit {
    pub date: DateTime<Utc>,
    pub technician: String,
    pub final_risk: Option<RiskLevel>,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
}

/// The recorded decision plus the validity window it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruling {
    pub decision: RulingDecision,
    pub denial_motive: Option<String>,
    pub validity_days: u32,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub obligations: Option<String>,
}

impl Ruling {
    /// expires_at = issued_at + validity_days. Recomputed only here, when
    /// the issue date is set.
    pub fn issue(&mut self, now: DateTime<Utc>) {
        self.issued_at = Some(now);
        self.expires_at = Some(now + Duration::days(i64::from(self.validity_days)));
    }
}

/// Caller-supplied input for `record_decision`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulingInput {
    pub decision: String,
    pub denial_motive: Option<String>,
    pub validity_days: Option<u32>,
    pub obligations: Option<String>,
    /// Overrides the stored coefficient and triggers a recalculation when
    /// the compensation method is automatic.
    pub coefficient: Option<f64>,
}

impl RulingInput {
    pub fn parse(&self) -> Result<RulingDecision> {
        let decision: RulingDecision = self
            .decision
            .parse()
            .map_err(|e: String| ArboreaError::validation("decision", e))?;

        if decision == RulingDecision::Denied
            && self
                .denial_motive
                .as_deref()
                .map_or(true, |m| m.trim().is_empty())
        {
            return Err(ArboreaError::validation(
                "denial_motive",
                "a denied ruling requires a motive",
            ));
        }

        if let Some(days) = self.validity_days {
            if days == 0 || days > MAX_VALIDITY_DAYS {
                return Err(ArboreaError::validation(
                    "validity_days",
                    format!("must be between 1 and {}", MAX_VALIDITY_DAYS),
                ));
            }
        }

        Ok(decision)
    }
}

/// Replacement-planting obligation attached to an approved intervention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompensationPlan {
    pub method: CompensationMethod,
    pub coefficient: Option<f64>,
    pub trees_to_plant: Option<u32>,
    pub recommended_species: Option<String>,
    pub planting_site: Option<String>,
    pub deadline: Option<String>,
    pub audit: Option<CompensationAudit>,
}

/// Paths to files produced by the external document generator. The workflow
/// stores these references; it never renders the documents itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Documents {
    pub permit_pdf: Option<String>,
    pub report_pdf: Option<String>,
    pub compensation_pdf: Option<String>,
    pub combined_pdf: Option<String>,
}

/// Input payload for `file_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPermit {
    pub applicant: Applicant,
    #[serde(default)]
    pub location: Location,
    pub tree: TreeSnapshot,
    pub request_type: RequestType,
    pub motive: Option<String>,
    #[serde(default)]
    pub compensation: CompensationPlan,
    pub created_by: Option<String>,
}

impl NewPermit {
    pub fn validate(&self) -> Result<()> {
        if self.applicant.name.trim().is_empty() {
            return Err(ArboreaError::validation("applicant.name", "must not be empty"));
        }
        if self.applicant.document_id.trim().is_empty() {
            return Err(ArboreaError::validation(
                "applicant.document_id",
                "must not be empty",
            ));
        }
        if self.tree.species_common.trim().is_empty() {
            return Err(ArboreaError::validation(
                "tree.species_common",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// A filed tree-intervention request, tracked from filing to closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit {
    pub id: i64,
    /// `AR-<year>-<5-digit sequence>`. Immutable once assigned.
    pub tracking_number: String,
    pub status: PermitStatus,
    pub applicant: Applicant,
    pub location: Location,
    pub tree: TreeSnapshot,
    pub request_type: RequestType,
    pub motive: Option<String>,
    pub visit: Option<SiteVisit>,
    pub ruling: Option<Ruling>,
    pub compensation: CompensationPlan,
    pub documents: Documents,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Format a year-scoped tracking number: `AR-2026-00042`.
pub fn format_tracking_number(year: i32, seq: u32) -> String {
    format!("AR-{}-{:05}", year, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applicant() -> Applicant {
        Applicant {
            name: "María Rodríguez".to_string(),
            document_id: "52.846.113".to_string(),
            phone: None,
            email: None,
            role: ApplicantRole::Owner,
        }
    }

    fn tree() -> TreeSnapshot {
        TreeSnapshot {
            species_common: "Roble".to_string(),
            species_scientific: None,
            species_id: None,
            dbh_cm: Some(45.0),
            height_m: None,
            crown_m: None,
            condition: None,
            initial_risk: None,
        }
    }

    fn new_permit() -> NewPermit {
        NewPermit {
            applicant: applicant(),
            location: Location::default(),
            tree: tree(),
            request_type: RequestType::Felling,
            motive: None,
            compensation: CompensationPlan::default(),
            created_by: None,
        }
    }

    #[test]
    fn test_forward_transitions_allowed() {
        use PermitStatus::*;
        assert!(Filed.can_transition(InVisit));
        assert!(InVisit.can_transition(InVisit));
        assert!(InVisit.can_transition(Assessment));
        assert!(Assessment.can_transition(Approved));
        assert!(Assessment.can_transition(Denied));
        assert!(Approved.can_transition(Closed));
        assert!(Denied.can_transition(Closed));
    }

    #[test]
    fn test_backward_and_skip_transitions_rejected() {
        use PermitStatus::*;
        assert!(!Closed.can_transition(Filed));
        assert!(!Filed.can_transition(Approved));
        assert!(!Filed.can_transition(Assessment));
        assert!(!Approved.can_transition(InVisit));
        assert!(!Closed.can_transition(Closed));
        assert!(!Denied.can_transition(Approved));
    }

    #[test]
    fn test_ruling_requires_visit_state() {
        assert!(!PermitStatus::Filed.ruling_allowed());
        assert!(PermitStatus::InVisit.ruling_allowed());
        assert!(PermitStatus::Assessment.ruling_allowed());
        assert!(!PermitStatus::Closed.ruling_allowed());
    }

    #[test]
    fn test_status_display_roundtrip() {
        for s in [
            "Radicada",
            "En visita",
            "Dictamen",
            "Aprobada",
            "Negada",
            "Cerrada",
        ] {
            let status: PermitStatus = s.parse().unwrap();
            assert_eq!(status.to_string(), s);
        }
    }

    #[test]
    fn test_validate_rejects_blank_applicant() {
        let mut p = new_permit();
        p.applicant.name = "  ".to_string();
        assert!(p.validate().is_err());

        let mut p = new_permit();
        p.applicant.document_id = String::new();
        assert!(p.validate().is_err());

        let mut p = new_permit();
        p.tree.species_common = String::new();
        assert!(p.validate().is_err());

        assert!(new_permit().validate().is_ok());
    }

    #[test]
    fn test_ruling_input_denied_requires_motive() {
        let input = RulingInput {
            decision: "Negado".to_string(),
            ..Default::default()
        };
        assert!(input.parse().is_err());

        let input = RulingInput {
            decision: "Negado".to_string(),
            denial_motive: Some("Especie protegida".to_string()),
            ..Default::default()
        };
        assert_eq!(input.parse().unwrap(), RulingDecision::Denied);
    }

    #[test]
    fn test_ruling_input_rejects_unknown_decision() {
        let input = RulingInput {
            decision: "Tal vez".to_string(),
            ..Default::default()
        };
        assert!(input.parse().is_err());
    }

    #[test]
    fn test_ruling_input_validity_bounds() {
        for days in [0u32, 16, 100] {
            let input = RulingInput {
                decision: "Aprobado".to_string(),
                validity_days: Some(days),
                ..Default::default()
            };
            assert!(input.parse().is_err(), "validity {} should fail", days);
        }
        let input = RulingInput {
            decision: "Aprobado".to_string(),
            validity_days: Some(15),
            ..Default::default()
        };
        assert!(input.parse().is_ok());
    }

    #[test]
    fn test_expiry_is_issue_plus_validity() {
        let mut ruling = Ruling {
            decision: RulingDecision::Approved,
            denial_motive: None,
            validity_days: 15,
            issued_at: None,
            expires_at: None,
            obligations: None,
        };
        let now = Utc::now();
        ruling.issue(now);
        assert_eq!(ruling.issued_at, Some(now));
        assert_eq!(ruling.expires_at, Some(now + Duration::days(15)));
    }

    #[test]
    fn test_tracking_number_format() {
        assert_eq!(format_tracking_number(2026, 1), "AR-2026-00001");
        assert_eq!(format_tracking_number(2026, 12345), "AR-2026-12345");
    }
}
