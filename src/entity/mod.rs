mod permit;
mod species;

pub use permit::{
    format_tracking_number, Applicant, ApplicantRole, CompensationMethod, CompensationPlan,
    Condition, Documents, Location, NewPermit, Permit, PermitStatus, RequestType, RiskLevel,
    Ruling, RulingDecision, RulingInput, SiteVisit, TreeSnapshot, DEFAULT_VALIDITY_DAYS,
    MAX_VALIDITY_DAYS,
};
pub use species::{Species, SpeciesCategory};
