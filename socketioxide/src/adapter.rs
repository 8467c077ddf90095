//! Room bookkeeping for one namespace (spec §4.6 "rooms", §9 design note).
//!
//! The real protocol allows an `Adapter` to be swapped out for a
//! cross-process implementation (Redis pub/sub, etc); this crate only ships
//! [`LocalAdapter`], which keeps rooms as an in-memory, per-process map, per
//! the Non-goals ("cross-process broadcast (rooms are per-process)").

use std::collections::HashSet;

use dashmap::DashMap;
use engineioxide::Sid;

/// A room name. Namespace-scoped: the same room name in two different
/// namespaces refers to two unrelated groups.
pub type Room = String;

/// Anything that can be turned into a list of room names: a single room, or
/// a collection of them (spec §4.6 `Join`/`Leave`/`To`).
pub trait RoomParam: Send + 'static {
    fn into_rooms(self) -> Vec<Room>;
}

impl RoomParam for Room {
    fn into_rooms(self) -> Vec<Room> {
        vec![self]
    }
}

impl RoomParam for &'static str {
    fn into_rooms(self) -> Vec<Room> {
        vec![self.to_string()]
    }
}

impl<I: Into<Room> + Send + 'static> RoomParam for Vec<I> {
    fn into_rooms(self) -> Vec<Room> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<const N: usize, I: Into<Room> + Send + 'static> RoomParam for [I; N] {
    fn into_rooms(self) -> Vec<Room> {
        self.into_iter().map(Into::into).collect()
    }
}

/// Flags that narrow a broadcast beyond its room/except sets (spec §4.6,
/// §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastFlags {
    /// Only consider sockets handled by this process (always true for
    /// [`LocalAdapter`]; kept as an explicit flag for when a distributed
    /// adapter is introduced).
    Local,
    /// Bound an `emit_with_ack` broadcast's collection window.
    Timeout,
}

/// The target set and modifiers for one broadcast operation (spec §4.6
/// `To`/`Except`, §4.7 `BroadcastTo`/`BroadcastToRoom`).
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    pub rooms: Vec<Room>,
    pub except: Vec<Room>,
    pub flags: HashSet<BroadcastFlags>,
}

/// Room membership bookkeeping for one namespace.
///
/// Implementations must be consistent under concurrent `add_all`/`del`/
/// `del_all` calls; [`LocalAdapter`] uses [`DashMap`] for exactly that.
pub trait Adapter: Send + Sync + 'static {
    fn new() -> Self;

    /// Joins `sid` to every room in `rooms`.
    fn add_all(&self, sid: Sid, rooms: Vec<Room>);

    /// Removes `sid` from a single room.
    fn del(&self, sid: Sid, room: &Room);

    /// Removes `sid` from every room it belongs to (socket teardown).
    fn del_all(&self, sid: Sid);

    /// The rooms `sid` currently belongs to.
    fn socket_rooms(&self, sid: Sid) -> Vec<Room>;

    /// Resolves a [`BroadcastOptions`] to the concrete set of socket ids it
    /// targets: the union of `rooms` (or every known socket if `rooms` is
    /// empty) minus `except`'s members (spec §4.6 `To(room).Emit`, §8 "a
    /// snapshot of membership taken at broadcast time").
    fn sockets(&self, opts: &BroadcastOptions) -> Vec<Sid>;
}

/// The process-local [`Adapter`]: a room → socket-id set plus its reverse
/// map for O(degree) teardown (spec §9 design note).
#[derive(Debug, Default)]
pub struct LocalAdapter {
    rooms: DashMap<Room, HashSet<Sid>>,
    socket_rooms: DashMap<Sid, HashSet<Room>>,
}

impl Adapter for LocalAdapter {
    fn new() -> Self {
        Self::default()
    }

    fn add_all(&self, sid: Sid, rooms: Vec<Room>) {
        let mut joined = self.socket_rooms.entry(sid).or_default();
        for room in rooms {
            self.rooms.entry(room.clone()).or_default().insert(sid);
            joined.insert(room);
        }
    }

    fn del(&self, sid: Sid, room: &Room) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&sid);
        }
        if let Some(mut joined) = self.socket_rooms.get_mut(&sid) {
            joined.remove(room);
        }
    }

    fn del_all(&self, sid: Sid) {
        if let Some((_, rooms)) = self.socket_rooms.remove(&sid) {
            for room in rooms {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(&sid);
                }
            }
        }
    }

    fn socket_rooms(&self, sid: Sid) -> Vec<Room> {
        self.socket_rooms
            .get(&sid)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sockets(&self, opts: &BroadcastOptions) -> Vec<Sid> {
        let mut targets: HashSet<Sid> = if opts.rooms.is_empty() {
            self.socket_rooms.iter().map(|e| *e.key()).collect()
        } else {
            let mut set = HashSet::new();
            for room in &opts.rooms {
                if let Some(members) = self.rooms.get(room) {
                    set.extend(members.iter().copied());
                }
            }
            set
        };
        for room in &opts.except {
            if let Some(members) = self.rooms.get(room) {
                for sid in members.iter() {
                    targets.remove(sid);
                }
            }
        }
        targets.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_to_a_room_excludes_the_sender() {
        let adapter = LocalAdapter::new();
        let (a, b, c) = (Sid::new(), Sid::new(), Sid::new());
        adapter.add_all(a, vec!["r".to_string()]);
        adapter.add_all(b, vec!["r".to_string()]);
        adapter.add_all(c, vec!["r".to_string()]);

        let opts = BroadcastOptions {
            rooms: vec!["r".to_string()],
            except: vec![],
            flags: HashSet::new(),
        };
        let mut targets = adapter.sockets(&opts);
        targets.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(targets, expected);
    }

    #[test]
    fn leaving_a_room_removes_membership_both_ways() {
        let adapter = LocalAdapter::new();
        let sid = Sid::new();
        adapter.add_all(sid, vec!["r1".to_string(), "r2".to_string()]);
        adapter.del(sid, &"r1".to_string());
        assert_eq!(adapter.socket_rooms(sid), vec!["r2".to_string()]);
        assert!(adapter.sockets(&BroadcastOptions {
            rooms: vec!["r1".to_string()],
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn del_all_drops_every_membership() {
        let adapter = LocalAdapter::new();
        let sid = Sid::new();
        adapter.add_all(sid, vec!["r1".to_string(), "r2".to_string()]);
        adapter.del_all(sid);
        assert!(adapter.socket_rooms(sid).is_empty());
    }
}
