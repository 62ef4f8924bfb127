mod job_status_test;
mod media_type_test;
