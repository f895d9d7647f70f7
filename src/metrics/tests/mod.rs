mod tests_throughput;
