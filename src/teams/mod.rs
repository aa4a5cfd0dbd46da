//! Teams, memberships, and the invitation lifecycle.

mod actions;
mod repository;
mod types;

pub use actions::{
    AcceptInvitationAction, AcceptInvitationOutput, InviteMemberAction, InviteMemberInput,
    InviteMemberOutput, PromoteMemberAction, PromoteMemberInput, RemoveMemberAction,
    RemoveMemberInput, RevokeInvitationAction, RevokeInvitationInput, TransferOwnershipAction,
    TransferOwnershipInput,
};
pub use repository::{
    CreateInvitation, CreateMembership, CreateTeam, TeamInvitationRepository,
    TeamMembershipRepository, TeamRepository,
};
pub use types::{InvitationStatus, Team, TeamInvitation, TeamMembership};

#[cfg(feature = "mocks")]
mod mocks;

#[cfg(feature = "mocks")]
pub use mocks::{
    MockTeamInvitationRepository, MockTeamMembershipRepository, MockTeamRepository,
};
