pub mod catalogue;

pub use catalogue::{Catalogue, catalogue_path, read_catalogue, truncate_catalogue, write_catalogue};
