// mod.rs - Input loaders

pub mod training;

pub use training::{load_groups_dir, load_tagged_fasta, load_training, TrainingSet};
