pub mod branch_rate;
pub mod rate_vector;
pub mod type_times;
