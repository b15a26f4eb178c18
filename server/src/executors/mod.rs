pub mod apps;
pub mod clusters;
pub mod groups;
pub mod instances;
pub mod secrets;
pub mod users;
