pub mod companies;
pub mod users;
