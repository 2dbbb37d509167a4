pub mod ticket_effects;
