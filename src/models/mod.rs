pub mod loaders;
pub mod plan;
pub mod plan_file;
pub mod question;
pub mod report;
pub mod snapshot;

pub use loaders::{load_accounts, load_all_plan_files, load_plan_file};
pub use plan::{ActionPlan, PlanStep, StepAction};
pub use plan_file::{FieldInput, PlanBuilder, PlanFile, RawAction, RawStep, TestSpec};
pub use question::{ChoiceAnswer, PageBlock, QuestionBody, QuestionSpec};
pub use report::{ActionReport, ExitCategory, FailureCause, StepOutcome, StepRecord, StepState};
pub use snapshot::TestSnapshot;
