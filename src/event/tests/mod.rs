mod tests_queue;
