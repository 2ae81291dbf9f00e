pub mod rig_dataset;
