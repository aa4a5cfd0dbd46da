mod accept;
mod invite;
mod promote;
mod remove;
mod revoke;
mod transfer;

pub use accept::{AcceptInvitationAction, AcceptInvitationOutput};
pub use invite::{InviteMemberAction, InviteMemberInput, InviteMemberOutput};
pub use promote::{PromoteMemberAction, PromoteMemberInput};
pub use remove::{RemoveMemberAction, RemoveMemberInput};
pub use revoke::{RevokeInvitationAction, RevokeInvitationInput};
pub use transfer::{TransferOwnershipAction, TransferOwnershipInput};
