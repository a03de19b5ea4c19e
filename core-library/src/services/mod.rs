//! Catalog services
//!
//! Each service is an explicit instance built from a shared store gateway,
//! the process-wide lock table and the runtime configuration. Services that
//! share a [`KeyedLocks`](crate::locks::KeyedLocks) serialize against each
//! other.

mod artist;
mod genre;
mod playlist;
mod song;

pub use artist::{ArtistService, FollowUpdate};
pub use genre::GenreService;
pub use playlist::PlaylistService;
pub use song::SongService;
