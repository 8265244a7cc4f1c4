pub mod deep;
pub mod model;
pub mod queue;
pub mod runner;
pub mod site_store;
pub mod worker;
