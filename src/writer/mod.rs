pub mod index_writer;
pub mod recovery;
