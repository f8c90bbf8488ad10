pub mod builder;
pub mod changes;
pub mod validation;

pub use builder::{
    ApprovalReport, CompletionStatus, PolicyCompliance, ReportInputs, ValidationStatus,
    build_report,
};
pub use changes::{Change, ChangeKind, ChangeSet};
pub use validation::{ValidationSummary, count_failures, strip_ansi, violated_rules};
