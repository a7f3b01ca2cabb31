//! Client registry: descriptor -> `Client`, plus the ordered list and
//! structural-change cookie.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use crate::client::Client;

#[derive(Default)]
pub struct ClientTable {
    clients: HashMap<RawFd, Client>,
    order: Vec<RawFd>,
    cookie: u64,
}

impl ClientTable {
    pub fn new() -> Self {
        ClientTable::default()
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.clients.contains_key(&fd)
    }

    pub fn get(&self, fd: RawFd) -> Option<&Client> {
        self.clients.get(&fd)
    }

    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut Client> {
        self.clients.get_mut(&fd)
    }

    /// Registers a new client. Returns `false` (without mutating anything)
    /// if `fd` is already present — the caller handles the Duplicate status
    /// and notification.
    pub fn insert(&mut self, client: Client) -> bool {
        let fd = client.fd;
        if self.clients.contains_key(&fd) {
            return false;
        }
        self.clients.insert(fd, client);
        self.order.push(fd);
        self.cookie += 1;
        fanout_utils::safe_assert_eq!(self.order.len(), self.clients.len());
        true
    }

    /// Removes `fd` from the hash and the ordered list in lockstep
    /// in lockstep with the hash map, bumping the cookie once.
    pub fn remove(&mut self, fd: RawFd) -> Option<Client> {
        let client = self.clients.remove(&fd)?;
        self.order.retain(|&f| f != fd);
        self.cookie += 1;
        fanout_utils::safe_assert_eq!(self.order.len(), self.clients.len());
        Some(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Descriptors in registration order.
    pub fn fds_in_order(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.order.iter().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RawFd, &mut Client)> {
        self.clients.iter_mut()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
        self.order.clear();
        self.cookie += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SyncMethod;
    use crate::queue::Limit;
    use crate::time::Nanos;

    fn client(fd: RawFd) -> Client {
        Client::new(fd, true, SyncMethod::Latest, Limit::NONE, Limit::NONE, Nanos::ZERO, "t".into())
    }

    #[test]
    fn insert_then_duplicate_rejected() {
        let mut t = ClientTable::new();
        assert!(t.insert(client(5)));
        assert!(!t.insert(client(5)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn remove_keeps_hash_and_order_in_sync() {
        let mut t = ClientTable::new();
        t.insert(client(5));
        t.insert(client(6));
        let before = t.cookie();
        assert!(t.remove(5).is_some());
        assert!(t.cookie() > before);
        assert!(!t.contains(5));
        assert_eq!(t.fds_in_order().collect::<Vec<_>>(), vec![6]);
    }
}
