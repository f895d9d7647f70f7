mod tests_config_update;
mod tests_determinism;
mod tests_step;
