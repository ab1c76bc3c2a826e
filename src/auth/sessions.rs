// Session registry
// Session ids are 24-bit values, packed big-endian into three bytes and
// base64-encoded to the four-character `sid` the wire protocol carries

use crate::core::{CellValue, CubeId, DatabaseId, ElementId, Identifier, OlapError, OlapResult,
    SessionId};
use crate::engine::SplashMode;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::{HashMap, VecDeque};

/// TTL applied when a session asks for interval 0: practically forever
const UNLIMITED_TTL_SECONDS: i64 = 24 * 3600 * 364 * 10;

/// One queued bulk cell write of a session
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCellWrite {
    pub database: DatabaseId,
    pub cube: CubeId,
    pub coord: Vec<ElementId>,
    pub value: CellValue,
    pub mode: SplashMode,
}

/// Client session
#[derive(Debug, Clone)]
pub struct Session {
    /// 24-bit session identifier, never zero
    pub id: SessionId,

    /// Authenticated user, if any
    pub user: Option<Identifier>,

    /// Worker sessions belong to external helper processes
    pub worker: bool,

    /// Expiry instant, pushed forward on every use
    pub expires_at: DateTime<Utc>,

    /// Queued bulk cell writes, replayed in FIFO order
    pub queued_writes: VecDeque<QueuedCellWrite>,

    ttl_seconds: i64,
}

impl Session {
    /// Refresh the expiry after a use
    pub fn touch(&mut self) {
        self.expires_at = Utc::now() + Duration::seconds(self.ttl_seconds);
    }

    /// True once the TTL has passed
    pub fn expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Encode a session id to its four-character wire form
pub fn encode_session_id(id: SessionId) -> String {
    let bytes = [(id >> 16) as u8, (id >> 8) as u8, id as u8];
    BASE64.encode(bytes)
}

/// Decode the four-character wire form of a session id
pub fn decode_session_id(sid: &str) -> OlapResult<SessionId> {
    let bytes = BASE64.decode(sid).map_err(|_| OlapError::InvalidSession)?;
    if bytes.len() != 3 {
        return Err(OlapError::InvalidSession);
    }
    Ok(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
}

/// Registry of the live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session with a fresh random id
    pub fn create(&mut self, user: Option<Identifier>, worker: bool, ttl_seconds: i64) -> SessionId {
        let ttl_seconds = if ttl_seconds == 0 {
            UNLIMITED_TTL_SECONDS
        } else {
            ttl_seconds
        };

        let mut rng = rand::thread_rng();
        let mut id: SessionId = rng.gen_range(1..=0x00FF_FFFF);
        while self.sessions.contains_key(&id) {
            id = (id % 0x00FF_FFFF) + 1;
        }

        let session = Session {
            id,
            user,
            worker,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
            queued_writes: VecDeque::new(),
            ttl_seconds,
        };
        self.sessions.insert(id, session);
        id
    }

    /// Session by id, refreshing its TTL; expired sessions are invalid
    pub fn use_session(&mut self, id: SessionId) -> OlapResult<&mut Session> {
        let expired = match self.sessions.get(&id) {
            Some(session) => session.expired(),
            None => return Err(OlapError::InvalidSession),
        };
        if expired {
            self.sessions.remove(&id);
            return Err(OlapError::InvalidSession);
        }
        let session = self.sessions.get_mut(&id).unwrap();
        session.touch();
        Ok(session)
    }

    /// Session by id without refreshing the TTL
    pub fn get(&self, id: SessionId) -> OlapResult<&Session> {
        match self.sessions.get(&id) {
            Some(session) if !session.expired() => Ok(session),
            _ => Err(OlapError::InvalidSession),
        }
    }

    /// Delete a session
    pub fn delete(&mut self, id: SessionId) -> OlapResult<Session> {
        self.sessions.remove(&id).ok_or(OlapError::InvalidSession)
    }

    /// Ids of the sessions whose TTL has passed
    pub fn expired_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| s.expired())
            .map(|s| s.id)
            .collect()
    }

    /// True if any live session belongs to the user
    pub fn is_user_active(&self, user: Identifier) -> bool {
        self.sessions
            .values()
            .any(|s| s.user == Some(user) && !s.expired())
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_encoding_round_trip() {
        for id in [1u32, 0x00AB_CDEF, 0x00FF_FFFF] {
            let sid = encode_session_id(id);
            assert_eq!(sid.len(), 4);
            assert_eq!(decode_session_id(&sid).unwrap(), id);
        }
        assert!(decode_session_id("!!").is_err());
    }

    #[test]
    fn test_create_and_use() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(Some(3), false, 3600);
        assert!(id > 0 && id <= 0x00FF_FFFF);

        let session = registry.use_session(id).unwrap();
        assert_eq!(session.user, Some(3));
        assert!(registry.is_user_active(3));
        assert!(!registry.is_user_active(4));
    }

    #[test]
    fn test_expired_session_is_invalid() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None, false, 3600);
        registry.sessions.get_mut(&id).unwrap().expires_at = Utc::now() - Duration::seconds(1);

        assert!(matches!(
            registry.use_session(id),
            Err(OlapError::InvalidSession)
        ));
        // second use: the session is gone entirely
        assert!(registry.get(id).is_err());
    }

    #[test]
    fn test_zero_ttl_is_practically_unlimited() {
        let mut registry = SessionRegistry::new();
        let id = registry.create(None, true, 0);
        let session = registry.get(id).unwrap();
        assert!(session.expires_at > Utc::now() + Duration::days(3000));
    }
}
