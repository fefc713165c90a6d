//! Demo domain: members that optionally belong to one team.
//!
//! # Responsibility
//! - Declare the `Member` and `Team` records and their storage mapping.
//! - Keep relation ownership on the member side (`team_id`).
//!
//! # Invariants
//! - Identifiers and audit fields are assigned by persistence only.
//! - A team's members are never cached on the team; they are looked up.

pub mod member;
pub mod team;

pub use member::{Member, MemberId};
pub use team::{Team, TeamId};
