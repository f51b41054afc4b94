//! Batched, permission-checked entity editing for Discord bots.
//!
//! Every mutable entity (guild, channel, role, member, webhook, the bot's
//! own account) gets a manager: a builder that accumulates sparse edits,
//! validates them eagerly, and dispatches a single minimal PATCH when
//! [`Updatable::update`] is called. Dirty tracking is a bitmask per manager,
//! so a batch only ever serializes the fields that actually changed, and an
//! untouched manager never contacts the network at all.
//!
//! Before anything is dispatched, the batch runs a client-side authorization
//! pre-flight against the cached guild state: capability bits, role
//! hierarchy, and permission-escalation rules. A rejection aborts the whole
//! batch atomically — no partial writes, staged edits retained for a retry.
//!
//! ```no_run
//! use discord_managers::id::GuildMarker;
//! use discord_managers::{EntityResolver, GuildManager, Id, Transport, Updatable, UpdateError};
//!
//! fn rename(
//!     cache: &dyn EntityResolver,
//!     transport: &dyn Transport,
//!     guild_id: Id<GuildMarker>,
//! ) -> Result<(), UpdateError> {
//!     let mut guild = GuildManager::new(cache, guild_id);
//!     guild.name("renamed")?.afk_timeout(300)?;
//!     guild.update(transport)?;
//!     Ok(())
//! }
//! ```
//!
//! [`Updatable::update`]: managers::Updatable::update

pub mod auth;
pub mod buffer;
pub mod diff;
pub mod entity;
pub mod error;
pub mod executor;
pub mod fields;
pub mod id;
pub mod managers;
pub mod overwrites;
pub mod permissions;
pub mod transport;

// Convenience re-exports for the common surface.
pub use auth::{permission_checks_enabled, set_permission_checks_enabled};
pub use buffer::{PendingChangeBuffer, StagedIcon, StagedValue};
pub use entity::{EntityResolver, InMemoryCache};
pub use error::UpdateError;
pub use executor::Outcome;
pub use fields::{DirtyFieldSet, FieldKey, FieldMask};
pub use id::Id;
pub use managers::{
    AccountManager, ChannelManager, GuildManager, MemberManager, PermOverrideManager, RoleManager,
    Updatable, WebhookManager,
};
pub use overwrites::OverwriteBatch;
pub use permissions::Permissions;
pub use transport::{RawResponse, Route, Transport, TransportError};

#[cfg(test)]
mod thread_safety {
    use static_assertions::assert_impl_all;

    // Buffers and snapshots move across threads in callback-driven clients.
    assert_impl_all!(crate::PendingChangeBuffer: Send, Sync);
    assert_impl_all!(crate::overwrites::StagedOverwrites: Send, Sync);
    assert_impl_all!(crate::Id<crate::id::GuildMarker>: Send, Sync, Copy);
    assert_impl_all!(crate::Permissions: Send, Sync, Copy);
    assert_impl_all!(crate::UpdateError: Send, Sync);
    assert_impl_all!(crate::auth::AuthorizationSnapshot: Send, Sync, Copy);
}
