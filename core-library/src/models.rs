//! Domain models for the music catalog
//!
//! Records arrive from the store as loose JSON maps. Each model maps the
//! store's field names onto typed fields and tolerates the usual looseness of
//! a generic store: missing fields, `null`, and numbers sent as strings.

use crate::error::{LibraryError, Result};
use crate::reconcile::AggregateSpec;
use crate::resolver::Relation;
use crate::toggle::JoinSpec;
use bridge_traits::store::{Record, RecordId, ID_FIELD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A typed view over one store collection.
pub trait StoreModel: DeserializeOwned + Send {
    /// Collection the records live in.
    const COLLECTION: &'static str;
    /// Human-readable entity name used in `NotFound` errors.
    const ENTITY: &'static str;
    /// Projection requested when reading the model.
    const FIELDS: &'static [&'static str];

    fn from_record(record: Record) -> Result<Self> {
        serde_json::from_value(Value::Object(record)).map_err(|e| LibraryError::Decode {
            collection: Self::COLLECTION.to_string(),
            message: e.to_string(),
        })
    }
}

/// Decode a batch of records, failing on the first malformed one.
pub fn decode_all<T: StoreModel>(records: Vec<Record>) -> Result<Vec<T>> {
    records.into_iter().map(T::from_record).collect()
}

// =============================================================================
// Entities
// =============================================================================

/// A song in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    #[serde(rename = "Id", deserialize_with = "lenient::id")]
    pub id: RecordId,
    #[serde(rename = "Name", default, deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(rename = "artist_c", default, deserialize_with = "lenient::text")]
    pub artist: String,
    #[serde(rename = "album_c", default, deserialize_with = "lenient::text")]
    pub album: String,
    #[serde(rename = "album_art_c", default, deserialize_with = "lenient::opt_text")]
    pub cover_image: Option<String>,
    #[serde(rename = "audio_url_c", default, deserialize_with = "lenient::opt_text")]
    pub audio_url: Option<String>,
    /// Duration in seconds
    #[serde(rename = "duration_c", default, deserialize_with = "lenient::count")]
    pub duration_secs: i64,
    #[serde(rename = "genre_c", default, deserialize_with = "lenient::opt_text")]
    pub genre: Option<String>,
    /// Owned by the play-tracking service; read-only here
    #[serde(rename = "play_count_c", default, deserialize_with = "lenient::count")]
    pub play_count: i64,
}

impl StoreModel for Song {
    const COLLECTION: &'static str = "song_c";
    const ENTITY: &'static str = "Song";
    const FIELDS: &'static [&'static str] = &[
        ID_FIELD,
        Song::TITLE,
        Song::ARTIST,
        Song::ALBUM,
        "album_art_c",
        "audio_url_c",
        "duration_c",
        Song::GENRE,
        Song::PLAY_COUNT,
    ];
}

impl Song {
    pub const TITLE: &'static str = "Name";
    pub const ARTIST: &'static str = "artist_c";
    pub const ALBUM: &'static str = "album_c";
    pub const GENRE: &'static str = "genre_c";
    pub const PLAY_COUNT: &'static str = "play_count_c";

    /// Base of the generated previews used when a song has no audio of its own.
    pub const PREVIEW_CDN: &'static str = "https://cdn.vibestream.io/previews";

    /// URL to preview the song: its own audio, or the generated CDN clip.
    pub fn preview_url(&self) -> String {
        match self.audio_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!("{}/song-{}-preview.mp3", Self::PREVIEW_CDN, self.id),
        }
    }
}

/// A user playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(rename = "Id", deserialize_with = "lenient::id")]
    pub id: RecordId,
    #[serde(rename = "name_c", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "description_c", default, deserialize_with = "lenient::opt_text")]
    pub description: Option<String>,
    #[serde(rename = "cover_image_c", default, deserialize_with = "lenient::opt_text")]
    pub cover_image: Option<String>,
    #[serde(rename = "user_id_c", default, deserialize_with = "lenient::opt_text")]
    pub owner: Option<String>,
    /// Derived from membership rows; written only by the reconciler
    #[serde(rename = "song_count_c", default, deserialize_with = "lenient::count")]
    pub song_count: i64,
}

impl StoreModel for Playlist {
    const COLLECTION: &'static str = "playlist_c";
    const ENTITY: &'static str = "Playlist";
    const FIELDS: &'static [&'static str] = &[
        ID_FIELD,
        Playlist::NAME,
        Playlist::DESCRIPTION,
        Playlist::COVER_IMAGE,
        Playlist::OWNER,
        Playlist::SONG_COUNT,
    ];
}

impl Playlist {
    pub const NAME: &'static str = "name_c";
    pub const DESCRIPTION: &'static str = "description_c";
    pub const COVER_IMAGE: &'static str = "cover_image_c";
    pub const OWNER: &'static str = "user_id_c";
    pub const SONG_COUNT: &'static str = "song_count_c";
}

/// An artist profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(rename = "Id", deserialize_with = "lenient::id")]
    pub id: RecordId,
    #[serde(rename = "name_c", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "bio_c", default, deserialize_with = "lenient::opt_text")]
    pub bio: Option<String>,
    #[serde(rename = "profile_image_c", default, deserialize_with = "lenient::opt_text")]
    pub profile_image: Option<String>,
    #[serde(rename = "follower_count_c", default, deserialize_with = "lenient::count")]
    pub follower_count: i64,
}

impl StoreModel for Artist {
    const COLLECTION: &'static str = "artist_c";
    const ENTITY: &'static str = "Artist";
    const FIELDS: &'static [&'static str] = &[
        ID_FIELD,
        "name_c",
        "bio_c",
        "profile_image_c",
        Artist::FOLLOWER_COUNT,
    ];
}

impl Artist {
    pub const FOLLOWER_COUNT: &'static str = "follower_count_c";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    #[serde(rename = "Id", deserialize_with = "lenient::id")]
    pub id: RecordId,
    #[serde(rename = "name_c", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "icon_c", default, deserialize_with = "lenient::opt_text")]
    pub icon: Option<String>,
}

impl StoreModel for Genre {
    const COLLECTION: &'static str = "genre_c";
    const ENTITY: &'static str = "Genre";
    const FIELDS: &'static [&'static str] = &[ID_FIELD, "name_c", "icon_c"];
}

/// One membership row: a song placed at a position in a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistMember {
    #[serde(rename = "Id", deserialize_with = "lenient::id")]
    pub row_id: RecordId,
    #[serde(rename = "playlist_id_c", deserialize_with = "lenient::id")]
    pub playlist_id: RecordId,
    #[serde(rename = "song_id_c", deserialize_with = "lenient::id")]
    pub song_id: RecordId,
    #[serde(rename = "position_c", default, deserialize_with = "lenient::count")]
    pub position: i64,
}

impl StoreModel for PlaylistMember {
    const COLLECTION: &'static str = PLAYLIST_SONGS.collection;
    const ENTITY: &'static str = "PlaylistSong";
    const FIELDS: &'static [&'static str] = &[
        ID_FIELD,
        PLAYLIST_SONGS.left,
        PLAYLIST_SONGS.right,
        PlaylistMember::POSITION,
    ];
}

impl PlaylistMember {
    pub const POSITION: &'static str = "position_c";
}

/// A ranked chart row; `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartEntry {
    pub rank: u32,
    pub song: Song,
}

/// A playlist together with its songs in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistWithSongs {
    pub playlist: Playlist,
    pub songs: Vec<Song>,
}

// =============================================================================
// Write models
// =============================================================================

/// Input for creating a playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub owner: Option<String>,
}

impl NewPlaylist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cover_image(mut self, cover_image: impl Into<String>) -> Self {
        self.cover_image = Some(cover_image.into());
        self
    }

    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.owner = Some(user_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }

    /// Store record for the new playlist. The aggregate starts at zero.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert(Playlist::NAME.into(), json!(self.name.trim()));
        record.insert(Playlist::DESCRIPTION.into(), json!(self.description));
        record.insert(Playlist::COVER_IMAGE.into(), json!(self.cover_image));
        record.insert(Playlist::OWNER.into(), json!(self.owner));
        record.insert(Playlist::SONG_COUNT.into(), json!(0));
        record
    }
}

/// Editable playlist fields. The song count is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
}

impl PlaylistUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.cover_image.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(LibraryError::validation(
                "PlaylistUpdate",
                "at least one of name, description or cover image must be set",
            ));
        }
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }

    pub fn to_record(&self, id: RecordId) -> Record {
        let mut record = Record::new();
        record.insert(ID_FIELD.into(), json!(id));
        if let Some(name) = &self.name {
            record.insert(Playlist::NAME.into(), json!(name.trim()));
        }
        if let Some(description) = &self.description {
            record.insert(Playlist::DESCRIPTION.into(), json!(description));
        }
        if let Some(cover_image) = &self.cover_image {
            record.insert(Playlist::COVER_IMAGE.into(), json!(cover_image));
        }
        record
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LibraryError::validation(
            "name",
            "Playlist name cannot be empty",
        ));
    }
    Ok(())
}

// =============================================================================
// Relationships
// =============================================================================

/// Playlist membership: `(playlist, song)`
pub const PLAYLIST_SONGS: JoinSpec = JoinSpec {
    collection: "playlist_song_c",
    left: "playlist_id_c",
    right: "song_id_c",
};

/// Follows: `(artist, user)`
pub const ARTIST_FOLLOWS: JoinSpec = JoinSpec {
    collection: "artist_follow_c",
    left: "artist_id_c",
    right: "user_id_c",
};

/// Likes: `(song, user)`
pub const SONG_LIKES: JoinSpec = JoinSpec {
    collection: "song_like_c",
    left: "song_id_c",
    right: "user_id_c",
};

pub const PLAYLIST_SONG_COUNT: AggregateSpec = AggregateSpec {
    owner_collection: Playlist::COLLECTION,
    aggregate_field: Playlist::SONG_COUNT,
    join_collection: PLAYLIST_SONGS.collection,
    owner_field: PLAYLIST_SONGS.left,
};

pub const ARTIST_FOLLOWER_COUNT: AggregateSpec = AggregateSpec {
    owner_collection: Artist::COLLECTION,
    aggregate_field: Artist::FOLLOWER_COUNT,
    join_collection: ARTIST_FOLLOWS.collection,
    owner_field: ARTIST_FOLLOWS.left,
};

/// Songs a user liked
pub const LIKED_SONGS: Relation = Relation {
    join_collection: SONG_LIKES.collection,
    filter_field: SONG_LIKES.right,
    target_field: SONG_LIKES.left,
};

/// Artists a user follows
pub const FOLLOWED_ARTISTS: Relation = Relation {
    join_collection: ARTIST_FOLLOWS.collection,
    filter_field: ARTIST_FOLLOWS.right,
    target_field: ARTIST_FOLLOWS.left,
};

mod lenient {
    use bridge_traits::store::{value_as_id, RecordId};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RecordId, D::Error> {
        let value = Value::deserialize(deserializer)?;
        value_as_id(&value).ok_or_else(|| D::Error::custom(format!("invalid record id: {}", value)))
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Value::String(s) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(opt_text(deserializer)?.unwrap_or_default())
    }

    pub fn opt_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }
}
