//! In-memory layouts of the standard classes
//!
//! Every struct starts with an [`ObjectHeader`]. Reference fields are
//! plain words so the collector can rewrite them in place.

use crate::object::ObjectHeader;

#[repr(C)]
pub struct Integer {
    pub header: ObjectHeader,
    pub value: i64,
}

#[repr(C)]
pub struct Bignum {
    pub header: ObjectHeader,
    pub limb_count: usize,
    pub limbs: [u64; 0],
}

#[repr(C)]
pub struct Ratio {
    pub header: ObjectHeader,
    pub numerator: usize,
    pub denominator: usize,
}

#[repr(C)]
pub struct DoubleFloat {
    pub header: ObjectHeader,
    pub value: f64,
}

#[repr(C)]
pub struct Cons {
    pub header: ObjectHeader,
    pub car: usize,
    pub cdr: usize,
}

#[repr(C)]
pub struct Symbol {
    pub header: ObjectHeader,
    /// Owning reference to the name string
    pub name: usize,
    pub package: usize,
    /// Value and function cells
    pub cells: [usize; 2],
    pub plist: usize,
    pub flags: u32,
    pub hash: u32,
}

#[repr(C)]
pub struct String {
    pub header: ObjectHeader,
    pub length: usize,
    pub bytes: [u8; 0],
}

#[repr(C)]
pub struct Vector {
    pub header: ObjectHeader,
    pub length: usize,
    pub elements: [usize; 0],
}

#[repr(C)]
pub struct HashTable {
    pub header: ObjectHeader,
    /// Owning reference to the [`HashTableStorage`]
    pub storage: usize,
    pub count: usize,
    /// Iteration cursor pointing into the storage; adjusted, never traced
    pub cursor: *mut usize,
    pub test: usize,
}

/// Backing store of a hash table: `capacity` key/value pairs
#[repr(C)]
pub struct HashTableStorage {
    pub header: ObjectHeader,
    pub capacity: usize,
    pub pairs: [[usize; 2]; 0],
}

#[repr(C)]
pub struct FileStream {
    pub header: ObjectHeader,
    pub path: usize,
    pub buffer: *mut u8,
    pub position: u64,
    pub fd: i32,
    pub mode: u32,
}

#[repr(C)]
pub struct Mutex {
    pub header: ObjectHeader,
    pub name: usize,
    pub handle: *mut u8,
}

#[repr(C)]
pub struct ForeignPointer {
    pub header: ObjectHeader,
    pub address: *mut u8,
    pub size: usize,
}

#[repr(C)]
pub struct Closure {
    pub header: ObjectHeader,
    pub entry: *const u8,
    pub name: usize,
    pub env_count: usize,
    pub env: [usize; 0],
}

#[repr(C)]
pub struct Package {
    pub header: ObjectHeader,
    pub name: usize,
    /// Owning reference to the symbol [`HashTable`]
    pub symbols: usize,
    pub uses: usize,
}

#[repr(C)]
pub struct Instance {
    pub header: ObjectHeader,
    pub class: usize,
    pub slot_count: usize,
    pub slots: [usize; 0],
}

#[repr(C)]
pub struct FuncallableInstance {
    pub header: ObjectHeader,
    pub class: usize,
    pub entry: *const u8,
    pub function: usize,
    pub slot_count: usize,
    pub slots: [usize; 0],
}
