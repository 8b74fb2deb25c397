
mod control_loop_tests;
mod scenario_tests;
