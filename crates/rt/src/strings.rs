//! Reference-counted, interned strings (spec.md §3, §4.6).
//!
//! A `Str` payload is a fixed [`StrHeader`] (length, and a `literal_refs`
//! counter distinguishing interned from heap-allocated strings) immediately
//! followed by the raw UTF-8 bytes. Grounded on the teacher's `seqstring.rs`
//! (`SeqString`): the same "owned heap string vs. immortal static string"
//! split, the same `is_interned`-style flag, reimplemented on top of this
//! crate's header-prefixed heap instead of `SeqString`'s bespoke
//! arena/global split (this runtime has no per-thread arena to bulk-free
//! into, so every string goes through `heap::heap_alloc`).

use crate::heap::{self, IMMORTAL};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, Once};

pub const TYPE_TAG_STR: u32 = 1;

#[repr(C)]
pub struct StrHeader {
    pub len: u32,
    pub literal_refs: AtomicU32,
}

fn data_ptr(payload: NonNull<u8>) -> *const u8 {
    unsafe { payload.as_ptr().add(std::mem::size_of::<StrHeader>()) }
}

/// Allocates a new, independently owned string with `refcnt = 1`.
pub fn alloc_string(bytes: &[u8]) -> NonNull<u8> {
    let payload_size = std::mem::size_of::<StrHeader>() + bytes.len();
    let payload = heap::heap_alloc(payload_size, TYPE_TAG_STR, None);
    unsafe {
        (payload.as_ptr() as *mut StrHeader).write(StrHeader {
            len: bytes.len() as u32,
            literal_refs: AtomicU32::new(0),
        });
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), payload.as_ptr().add(std::mem::size_of::<StrHeader>()), bytes.len());
    }
    payload
}

/// Borrows the UTF-8 contents of a `Str` payload. The returned slice is
/// valid as long as the caller holds a reference (retained or borrowed per
/// the calling convention in spec.md §4.6).
///
/// # Safety
/// `payload` must be a live `Str` payload returned by this module.
pub unsafe fn as_str<'a>(payload: NonNull<u8>) -> &'a str {
    let header = &*(payload.as_ptr() as *const StrHeader);
    let slice = std::slice::from_raw_parts(data_ptr(payload), header.len as usize);
    std::str::from_utf8_unchecked(slice)
}

pub fn len(payload: NonNull<u8>) -> u32 {
    unsafe { (*(payload.as_ptr() as *const StrHeader)).len }
}

pub fn is_interned(payload: NonNull<u8>) -> bool {
    heap::refcount(payload) == IMMORTAL
}

// --- Intern table: FNV-1a open addressing (spec.md §4.6) ---

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

struct InternTable {
    slots: Vec<Option<(Box<[u8]>, NonNull<u8>)>>,
    count: usize,
}

// Safety: interned payloads are immortal heap allocations never mutated
// after construction (the table only ever reads/compares their bytes), so
// sharing `NonNull<u8>` handles across threads behind the table's mutex is
// sound even though `NonNull` itself opts out of `Send`/`Sync`.
unsafe impl Send for InternTable {}

impl InternTable {
    fn with_capacity(cap: usize) -> Self {
        let mut slots = Vec::with_capacity(cap);
        slots.resize_with(cap, || None);
        InternTable { slots, count: 0 }
    }

    fn intern(&mut self, bytes: &[u8]) -> NonNull<u8> {
        if self.count * 2 >= self.slots.len() {
            self.grow();
        }
        let mut idx = (fnv1a(bytes) as usize) % self.slots.len();
        loop {
            match &self.slots[idx] {
                None => {
                    let payload = alloc_string(bytes);
                    heap::mark_immortal(payload);
                    self.slots[idx] = Some((bytes.to_vec().into_boxed_slice(), payload));
                    self.count += 1;
                    return payload;
                }
                Some((key, existing)) if key.as_ref() == bytes => {
                    let header = unsafe { &*(existing.as_ptr() as *const StrHeader) };
                    header.literal_refs.fetch_add(1, Ordering::Relaxed);
                    return *existing;
                }
                Some(_) => idx = (idx + 1) % self.slots.len(),
            }
        }
    }

    fn grow(&mut self) {
        let new_cap = (self.slots.len() * 2).max(16);
        let mut grown = InternTable::with_capacity(new_cap);
        for entry in self.slots.drain(..).flatten() {
            let (key, payload) = entry;
            let mut idx = (fnv1a(&key) as usize) % grown.slots.len();
            while grown.slots[idx].is_some() {
                idx = (idx + 1) % grown.slots.len();
            }
            grown.slots[idx] = Some((key, payload));
            grown.count += 1;
        }
        *self = grown;
    }
}

static INTERN_TABLE: Mutex<Option<InternTable>> = Mutex::new(None);
static INTERN_INIT: Once = Once::new();

fn with_table<R>(f: impl FnOnce(&mut InternTable) -> R) -> R {
    INTERN_INIT.call_once(|| {
        *INTERN_TABLE.lock().expect("intern table lock poisoned during init") =
            Some(InternTable::with_capacity(64));
    });
    let mut guard = INTERN_TABLE.lock().expect("intern table lock poisoned");
    f(guard.as_mut().expect("intern table initialized"))
}

/// Interns `bytes`, returning the canonical immortal payload for that byte
/// sequence. Equal bytes always return the same pointer, so string equality
/// for interned literals is an O(1) pointer comparison.
pub fn intern(bytes: &[u8]) -> NonNull<u8> {
    with_table(|t| t.intern(bytes))
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    with_table(|t| *t = InternTable::with_capacity(64));
}
