pub mod blocks;
pub mod one_time_codes;
