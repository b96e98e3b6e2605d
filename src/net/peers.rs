//! Peer table kept by the coordinating process

use std::collections::BTreeMap;

use super::protocol::{PeerId, PeerState};

/// One connected participant
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    /// None until the first state record arrives
    pub state: Option<PeerState>,
}

/// Connected peers keyed by id, plus the single host
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: BTreeMap<PeerId, PeerRecord>,
    host: Option<PeerId>,
    next_id: u32,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; the first peer in an empty table hosts
    ///
    /// Returns the assigned id and whether it is the host.
    pub fn add(&mut self) -> (PeerId, bool) {
        self.next_id += 1;
        let id = format!("{:03}", self.next_id);
        self.insert(id.clone());
        let is_host = self.host.as_deref() == Some(id.as_str());
        (id, is_host)
    }

    /// Register a peer under a known id
    pub fn insert(&mut self, id: PeerId) {
        if self.host.is_none() {
            log::info!("Peer {} is now host", id);
            self.host = Some(id.clone());
        }
        self.peers.insert(id, PeerRecord { state: None });
    }

    /// Drop a peer; returns the new host if the host left and someone remains
    pub fn remove(&mut self, id: &str) -> Option<PeerId> {
        self.peers.remove(id)?;
        if self.host.as_deref() != Some(id) {
            return None;
        }
        self.host = self.peers.keys().next().cloned();
        match &self.host {
            Some(new_host) => log::info!("Host {} left, migrating to {}", id, new_host),
            None => log::info!("Host {} left, no peers remain", id),
        }
        self.host.clone()
    }

    pub fn update_state(&mut self, id: &str, state: PeerState) {
        if let Some(record) = self.peers.get_mut(id) {
            record.state = Some(state);
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host.as_deref() == Some(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.peers.keys().map(String::as_str)
    }

    /// Peers that have reported at least once
    pub fn snapshot(&self) -> BTreeMap<PeerId, PeerState> {
        self.peers
            .iter()
            .filter_map(|(id, rec)| rec.state.clone().map(|s| (id.clone(), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn state(x: f32) -> PeerState {
        PeerState {
            pos: Vec2::new(x, 0.0),
            status: "walk".to_string(),
            char_type: "adventurer".to_string(),
        }
    }

    #[test]
    fn test_first_peer_hosts() {
        let mut table = PeerTable::new();
        assert_eq!(table.add(), ("001".to_string(), true));
        assert_eq!(table.add(), ("002".to_string(), false));
        assert_eq!(table.host(), Some("001"));
    }

    #[test]
    fn test_host_leaving_migrates_to_lowest_id() {
        let mut table = PeerTable::new();
        table.insert("003".to_string());
        table.insert("001".to_string());
        table.insert("002".to_string());
        assert_eq!(table.host(), Some("003"));

        assert_eq!(table.remove("003"), Some("001".to_string()));
        assert_eq!(table.host(), Some("001"));
    }

    #[test]
    fn test_non_host_leaving_keeps_host() {
        let mut table = PeerTable::new();
        table.add();
        table.add();
        table.add();
        assert_eq!(table.remove("002"), None);
        assert_eq!(table.host(), Some("001"));
        assert_eq!(table.remove("nobody"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_last_peer_leaving_clears_host() {
        let mut table = PeerTable::new();
        table.add();
        assert_eq!(table.remove("001"), None);
        assert!(table.is_empty());
        assert_eq!(table.host(), None);
        // Next arrival hosts, ids keep counting
        assert_eq!(table.add(), ("002".to_string(), true));
    }

    #[test]
    fn test_snapshot_skips_silent_peers() {
        let mut table = PeerTable::new();
        table.add();
        table.add();
        table.update_state("002", state(4.0));
        table.update_state("999", state(1.0));
        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["002"].pos.x, 4.0);
    }
}
