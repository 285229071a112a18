pub mod mom_store;
