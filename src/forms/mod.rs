//! 表单合成层
//!
//! `Mutation`（调用方想改什么）+ `FormModel`（页面上实际有什么）→ `SubmissionPayload`

pub mod mutation;
pub mod payload;
pub mod synthesizer;

pub use mutation::{DesiredValue, FieldKey, FieldMutation, Mutation, Presence};
pub use payload::{PayloadValue, SubmissionPayload};
pub use synthesizer::{pending_changes, synthesize_form, FieldChange};
