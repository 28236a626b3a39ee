mod snapshot_tests;
mod test_helpers;
