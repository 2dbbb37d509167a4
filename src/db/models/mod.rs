mod invitation;
mod notification;
mod org;
mod project;
mod ticket;
mod user;

pub use invitation::Invitation;
pub use notification::{ActivityEntry, Notification};
pub use org::{Department, Organization, OrgMember};
pub use project::{Project, ProjectDepartmentShare, ProjectMember};
pub use ticket::{Ticket, TicketPriority, TicketStatus};
pub use user::User;
