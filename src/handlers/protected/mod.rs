pub mod auth;
pub mod departments;
pub mod invitations;
pub mod notifications;
pub mod orgs;
pub mod projects;
pub mod tickets;

mod utils;
