mod scaffold_engine_test;
mod voice_activity_test;
