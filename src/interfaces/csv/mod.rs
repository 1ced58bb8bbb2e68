pub mod appointment_writer;
pub mod command_reader;
