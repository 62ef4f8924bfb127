mod error;
mod health;
mod info;
mod job_status;
mod models;
mod transcribe;

pub use error::{ApiError, ErrorResponse, JOB_ID_HEADER};
pub use health::{health_handler, readiness_handler};
pub use info::info_handler;
pub use job_status::{cancel_job_handler, job_status_handler};
pub use models::models_handler;
pub use transcribe::transcribe_handler;
