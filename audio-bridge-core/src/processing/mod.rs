pub mod clock_source;
pub mod elastic_buffer;
