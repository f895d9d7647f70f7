mod tests_picker;
