mod lifecycle_test;
mod recover_test;
mod start_test;
