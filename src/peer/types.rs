//! Peer role module
//!
//! One-byte role tags carried by every peer.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Role tag of a domain server
pub const PEER_TYPE_DOMAIN: u8 = b'D';
/// Role tag of a voxel (content) server
pub const PEER_TYPE_VOXEL: u8 = b'V';
/// Role tag of a client interface
pub const PEER_TYPE_AVATAR: u8 = b'I';
/// Role tag of an audio mixer
pub const PEER_TYPE_AUDIO_MIXER: u8 = b'M';
/// Role tag of an avatar mixer
pub const PEER_TYPE_AVATAR_MIXER: u8 = b'W';

/// Role a peer plays in the simulation network
#[derive(Debug, Clone, Copy)]
pub enum PeerType {
    /// Domain server handing out peer lists
    Domain,
    /// Voxel (content) server
    VoxelServer,
    /// Client interface driving an avatar
    Client,
    /// Audio mixer
    AudioMixer,
    /// Avatar mixer
    AvatarMixer,
    /// Any tag we don't recognise, kept verbatim
    Unknown(u8),
}

impl PeerType {
    /// Decode a role tag
    pub fn from_byte(tag: u8) -> Self {
        match tag {
            PEER_TYPE_DOMAIN => PeerType::Domain,
            PEER_TYPE_VOXEL => PeerType::VoxelServer,
            PEER_TYPE_AVATAR => PeerType::Client,
            PEER_TYPE_AUDIO_MIXER => PeerType::AudioMixer,
            PEER_TYPE_AVATAR_MIXER => PeerType::AvatarMixer,
            other => PeerType::Unknown(other),
        }
    }

    /// The raw role tag
    pub fn as_byte(&self) -> u8 {
        match self {
            PeerType::Domain => PEER_TYPE_DOMAIN,
            PeerType::VoxelServer => PEER_TYPE_VOXEL,
            PeerType::Client => PEER_TYPE_AVATAR,
            PeerType::AudioMixer => PEER_TYPE_AUDIO_MIXER,
            PeerType::AvatarMixer => PEER_TYPE_AVATAR_MIXER,
            PeerType::Unknown(tag) => *tag,
        }
    }

    /// Human readable role name
    pub fn name(&self) -> &'static str {
        match PeerType::from_byte(self.as_byte()) {
            PeerType::Domain => "Domain",
            PeerType::VoxelServer => "Voxel Server",
            PeerType::Client => "Client Interface",
            PeerType::AudioMixer => "Audio Mixer",
            PeerType::AvatarMixer => "Avatar Mixer",
            PeerType::Unknown(_) => "Unknown",
        }
    }

    /// Role tag rendered as a character for log lines
    pub fn tag_char(&self) -> char {
        char::from(self.as_byte())
    }

    /// Servers we talk to directly on their public address
    pub fn prefers_public_socket(&self) -> bool {
        matches!(
            PeerType::from_byte(self.as_byte()),
            PeerType::VoxelServer | PeerType::AudioMixer | PeerType::AvatarMixer
        )
    }
}

// Equality goes through the raw tag so that `Unknown(b'D')` and `Domain`
// are the same role.
impl PartialEq for PeerType {
    fn eq(&self, other: &Self) -> bool {
        self.as_byte() == other.as_byte()
    }
}

impl Eq for PeerType {}

impl Hash for PeerType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_byte().hash(state);
    }
}

impl From<u8> for PeerType {
    fn from(tag: u8) -> Self {
        PeerType::from_byte(tag)
    }
}

impl From<PeerType> for u8 {
    fn from(peer_type: PeerType) -> Self {
        peer_type.as_byte()
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.tag_char())
    }
}
