use std::fmt;

const KIND_BITS: u32 = 2;
const INDEX_BITS: u32 = 24;
const GENERATION_BITS: u32 = usize::BITS - KIND_BITS - INDEX_BITS;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = (1 << GENERATION_BITS) - 1;

/// The three levels of the handle hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
}

impl HandleKind {
    fn tag(self) -> usize {
        match self {
            HandleKind::Environment => 1,
            HandleKind::Connection => 2,
            HandleKind::Statement => 3,
        }
    }

    fn from_tag(tag: usize) -> Option<Self> {
        match tag {
            1 => Some(HandleKind::Environment),
            2 => Some(HandleKind::Connection),
            3 => Some(HandleKind::Statement),
            _ => None,
        }
    }

    /// `SQL_HANDLE_ENV` / `SQL_HANDLE_DBC` / `SQL_HANDLE_STMT`.
    pub fn from_sql(handle_type: i16) -> Option<Self> {
        match handle_type {
            crate::api::SQL_HANDLE_ENV => Some(HandleKind::Environment),
            crate::api::SQL_HANDLE_DBC => Some(HandleKind::Connection),
            crate::api::SQL_HANDLE_STMT => Some(HandleKind::Statement),
            _ => None,
        }
    }

    pub fn to_sql(self) -> i16 {
        match self {
            HandleKind::Environment => crate::api::SQL_HANDLE_ENV,
            HandleKind::Connection => crate::api::SQL_HANDLE_DBC,
            HandleKind::Statement => crate::api::SQL_HANDLE_STMT,
        }
    }
}

/// Generation-checked slot reference. Encoded into a single non-zero machine
/// word when it crosses the C ABI: kind tag in the top two bits, then the
/// generation, then a 24-bit slot index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    kind: HandleKind,
    index: u32,
    generation: u32,
}

impl HandleId {
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn to_raw(self) -> usize {
        (self.kind.tag() << (usize::BITS - KIND_BITS))
            | ((self.generation as usize & GENERATION_MASK) << INDEX_BITS)
            | (self.index as usize & INDEX_MASK)
    }

    pub fn from_raw(raw: usize) -> Option<Self> {
        let kind = HandleKind::from_tag(raw >> (usize::BITS - KIND_BITS))?;
        Some(Self {
            kind,
            index: (raw & INDEX_MASK) as u32,
            generation: ((raw >> INDEX_BITS) & GENERATION_MASK) as u32,
        })
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}v{}", self.kind, self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage for one handle kind. Freed slots are reused with a bumped
/// generation, so a stale id never resolves to the new occupant.
pub struct Arena<T> {
    kind: HandleKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> HandleId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.len += 1;
        HandleId {
            kind: self.kind,
            index,
            generation: slot.generation,
        }
    }

    fn slot(&self, id: HandleId) -> Option<&Slot<T>> {
        if id.kind != self.kind {
            return None;
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: HandleId) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut T> {
        self.slot(id)?;
        self.slots[id.index as usize].value.as_mut()
    }

    pub fn remove(&mut self, id: HandleId) -> Option<T> {
        self.slot(id)?;
        let slot = &mut self.slots[id.index as usize];
        let value = slot.value.take()?;
        slot.generation = ((slot.generation as usize + 1) & GENERATION_MASK) as u32;
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (HandleId, &T)> {
        let kind = self.kind;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    HandleId {
                        kind,
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = Arena::new(HandleKind::Connection);
        let id = arena.insert("dbc");
        assert_eq!(arena.get(id), Some(&"dbc"));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.remove(id), Some("dbc"));
        assert!(arena.is_empty());
        assert_eq!(arena.get(id), None);
        assert_eq!(arena.remove(id), None);
    }

    #[test]
    fn test_stale_id_does_not_resolve_to_reused_slot() {
        let mut arena = Arena::new(HandleKind::Statement);
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);
        assert_ne!(first, second);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&2));
        assert_ne!(first.to_raw(), second.to_raw());
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut envs = Arena::new(HandleKind::Environment);
        let mut dbcs: Arena<u8> = Arena::new(HandleKind::Connection);
        let env = envs.insert(0u8);
        assert!(!dbcs.contains(env));
        assert!(dbcs.get_mut(env).is_none());
    }

    #[test]
    fn test_raw_encoding() {
        let mut arena = Arena::new(HandleKind::Environment);
        let id = arena.insert(());
        let raw = id.to_raw();
        assert_ne!(raw, 0);
        assert_eq!(HandleId::from_raw(raw), Some(id));
        assert_eq!(HandleId::from_raw(raw).map(|id| id.kind()), Some(HandleKind::Environment));
    }

    #[test]
    fn test_raw_decoding_rejects_untagged_values() {
        assert_eq!(HandleId::from_raw(0), None);
        assert_eq!(HandleId::from_raw(12345), None);
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut arena = Arena::new(HandleKind::Statement);
        let a = arena.insert('a');
        let b = arena.insert('b');
        arena.remove(a);
        let live: Vec<_> = arena.iter().collect();
        assert_eq!(live, vec![(b, &'b')]);
    }

    #[test]
    fn test_sql_handle_types() {
        assert_eq!(HandleKind::from_sql(2), Some(HandleKind::Connection));
        assert_eq!(HandleKind::from_sql(4), None);
        assert_eq!(HandleKind::Statement.to_sql(), 3);
    }
}
