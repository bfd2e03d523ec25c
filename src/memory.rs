//! Emulated memory.
//!
//! Memory is a hash table of [`BUCKETS`] chains kept in storage as
//! `mem: [[{a:<addr>,v:<value>}, ...], ...]`. Storage lists only offer front
//! access, append, prepend and removal, so the generated routines reach bucket
//! `i` by popping `i` buckets onto `mem_tmp`, and reach a record by popping
//! records onto `bin_tmp`. Everything popped is prepended back in reverse order
//! before returning, so an access never reorders the table.
//!
//! [`MemTable`] is the same table with plain indexed access. The initializer
//! uses it to pre-hash literal data and the simulator decodes storage into it.

use std::fmt::{self, Write as _};

use crate::emit::{
    self, call, data_append, data_append_from, data_get, data_prepend_from, data_remove,
    data_set, get, operation, set, Block, Datapack, Execute, Function, MatchRange,
};
use crate::ir::Value;
use crate::symbol::Scratch;

/// Odd multiplier spreading addresses over the buckets.
pub const MEM_PHI: i32 = 27146105;
/// Bucket count. Must stay a power of two for [`bucket_of`] to match `%=`.
pub const BUCKETS: usize = 32;

pub const STORE_MEM: &str = "storemem";
pub const STORE_MEM_SHIFT: &str = "storememsh";
pub const STORE_SAFE_BIN: &str = "safestorebin";
pub const STORE_BIN: &str = "storebin";
pub const STORE_BIN_SHIFT: &str = "storebinsh";
pub const STORE_VAL: &str = "storeval";
pub const LOAD_MEM: &str = "loadmem";
pub const LOAD_MEM_SHIFT: &str = "loadmemsh";
pub const LOAD_SAFE_BIN: &str = "safeloadbin";
pub const LOAD_BIN: &str = "loadbin";
pub const LOAD_BIN_SHIFT: &str = "loadbinsh";

/// Bucket index of `addr`.
///
/// Equal to what `*= phi` followed by `%= 32` computes on a 32-bit score.
pub fn bucket_of(addr: i32) -> usize {
    ((addr as u32).wrapping_mul(MEM_PHI as u32) as usize) & (BUCKETS - 1)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Record {
    pub addr: i32,
    pub value: i32,
}

/// Indexed hash table with chaining.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemTable {
    buckets: Vec<Vec<Record>>,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    pub fn new() -> Self {
        MemTable {
            buckets: vec![Vec::new(); BUCKETS],
        }
    }

    pub fn from_buckets(buckets: Vec<Vec<Record>>) -> Self {
        debug_assert_eq!(buckets.len(), BUCKETS);
        MemTable { buckets }
    }

    /// Overwrite in place, or append to the end of the chain.
    pub fn store(&mut self, addr: i32, value: i32) {
        let chain = &mut self.buckets[bucket_of(addr)];
        match chain.iter_mut().find(|r| r.addr == addr) {
            Some(record) => record.value = value,
            None => chain.push(Record { addr, value }),
        }
    }

    /// Unwritten addresses read as zero.
    pub fn load(&self, addr: i32) -> i32 {
        self.buckets[bucket_of(addr)]
            .iter()
            .find(|r| r.addr == addr)
            .map_or(0, |r| r.value)
    }

    pub fn buckets(&self) -> &[Vec<Record>] {
        &self.buckets
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records sorted by address.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.buckets.iter().flatten().copied().collect();
        records.sort_by_key(|r| r.addr);
        records
    }

    /// Every address lives in the bucket it hashes to, at most once.
    pub fn is_well_formed(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.buckets.len() == BUCKETS
            && self.buckets.iter().enumerate().all(|(i, chain)| {
                chain
                    .iter()
                    .all(|r| bucket_of(r.addr) == i && seen.insert(r.addr))
            })
    }
}

/// SNBT literal of the whole table, as held in storage.
impl fmt::Display for MemTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('[')?;
        for (i, chain) in self.buckets.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            f.write_char('[')?;
            for (j, r) in chain.iter().enumerate() {
                if j > 0 {
                    f.write_char(',')?;
                }
                write!(f, "{{a:{},v:{}}}", r.addr, r.value)?;
            }
            f.write_char(']')?;
        }
        f.write_char(']')
    }
}

/// Reset the table and both scratch lists to empty.
pub fn emit_reset(out: &mut Block) {
    out.emit(data_set("mem", &MemTable::new().to_string()));
    out.emit(data_set("mem_tmp", "[]"));
    out.emit(data_set("bin_tmp", "[]"));
}

/// Replace the table with a pre-hashed literal.
pub fn emit_literal(out: &mut Block, table: &MemTable) {
    out.emit(data_set("mem", &table.to_string()));
}

/// Point the bucket cursor at `addr`'s bucket.
fn emit_address(out: &mut Block, addr: Value) {
    let mem_addr = Scratch::MemAddr.objective();
    let mem_idx = Scratch::MemIdx.objective();
    out.emit(emit::assign(mem_addr, addr));
    match addr {
        Value::Imm(imm) => out.emit(set(mem_idx, bucket_of(imm) as i32)),
        Value::Reg(_) => {
            out.emit(emit::assign(mem_idx, addr));
            out.emit(operation(mem_idx, "*=", Scratch::MemPhi.objective()));
            out.emit(operation(mem_idx, "%=", Scratch::MemLen.objective()));
        }
    }
    out.emit(data_set("mem_tmp", "[]"));
}

/// `mem[addr] = value`
pub fn emit_store(out: &mut Block, addr: Value, value: Value) {
    out.emit(emit::assign(Scratch::MemVal.objective(), value));
    emit_address(out, addr);
    out.emit(call(STORE_MEM));
}

/// `elvm_mem_res = mem[addr]`
pub fn emit_load(out: &mut Block, addr: Value) {
    emit_address(out, addr);
    out.emit(call(LOAD_MEM));
}

/// Names and terminal actions of one access protocol.
struct Protocol {
    mem: &'static str,
    mem_shift: &'static str,
    safe_bin: &'static str,
    bin: &'static str,
    bin_shift: &'static str,
    /// Runs when the front record holds the address
    found: String,
    /// Runs when the chain is exhausted
    missing: String,
}

impl Protocol {
    fn store() -> Self {
        Protocol {
            mem: STORE_MEM,
            mem_shift: STORE_MEM_SHIFT,
            safe_bin: STORE_SAFE_BIN,
            bin: STORE_BIN,
            bin_shift: STORE_BIN_SHIFT,
            found: address_match(true)
                .store_storage("mem[0][0].v")
                .run(&get(Scratch::MemVal.objective())),
            missing: call(STORE_VAL),
        }
    }

    fn load() -> Self {
        Protocol {
            mem: LOAD_MEM,
            mem_shift: LOAD_MEM_SHIFT,
            safe_bin: LOAD_SAFE_BIN,
            bin: LOAD_BIN,
            bin_shift: LOAD_BIN_SHIFT,
            found: address_match(true)
                .store_score(Scratch::MemRes.objective())
                .run(&data_get("mem[0][0].v")),
            missing: set(Scratch::MemRes.objective(), 0),
        }
    }

    fn define(self, pack: &mut Datapack) {
        let idx = Scratch::MemIdx.objective();
        let at_target = MatchRange::exactly(0);

        // Walk to the target bucket
        let mut f = Function::new(self.mem);
        f.line(Execute::new().matches(true, idx, at_target).run(&data_set("bin_tmp", "[]")));
        f.line(Execute::new().matches(true, idx, at_target).run(&call(self.safe_bin)));
        f.line(Execute::new().matches(false, idx, at_target).run(&call(self.mem_shift)));
        pack.insert(f);

        let mut f = Function::new(self.mem_shift);
        f.line(data_append_from("mem_tmp", "mem[0]"));
        f.line(data_remove("mem[0]"));
        f.line(emit::remove(idx, 1));
        f.line(call(self.mem));
        f.line(data_prepend_from("mem", "mem_tmp[-1]"));
        f.line(data_remove("mem_tmp[-1]"));
        pack.insert(f);

        // Walk the chain of the bucket now at mem[0]
        let mut f = Function::new(self.safe_bin);
        f.line(Execute::new().data(true, "mem[0][0]").run(&call(self.bin)));
        f.line(Execute::new().data(false, "mem[0][0]").run(&self.missing));
        pack.insert(f);

        let mut f = Function::new(self.bin);
        f.line(
            Execute::new()
                .store_score(Scratch::TestAddr.objective())
                .run(&data_get("mem[0][0].a")),
        );
        f.line(self.found);
        f.line(address_match(false).run(&call(self.bin_shift)));
        pack.insert(f);

        let mut f = Function::new(self.bin_shift);
        f.line(data_append_from("bin_tmp", "mem[0][0]"));
        f.line(data_remove("mem[0][0]"));
        f.line(call(self.safe_bin));
        f.line(data_prepend_from("mem[0]", "bin_tmp[-1]"));
        f.line(data_remove("bin_tmp[-1]"));
        pack.insert(f);
    }
}

fn address_match(positive: bool) -> Execute {
    Execute::new().compare(
        positive,
        Scratch::MemAddr.objective(),
        "=",
        Scratch::TestAddr.objective(),
    )
}

/// Define the bucket walk, chain walk and insert routines for both protocols.
pub fn define_routines(pack: &mut Datapack) {
    Protocol::store().define(pack);

    // Chain exhausted: the bucket at mem[0] is empty here
    let mut f = Function::new(STORE_VAL);
    f.line(data_append("mem[0]", "{}"));
    f.line(
        Execute::new()
            .store_storage("mem[0][0].a")
            .run(&get(Scratch::MemAddr.objective())),
    );
    f.line(
        Execute::new()
            .store_storage("mem[0][0].v")
            .run(&get(Scratch::MemVal.objective())),
    );
    pack.insert(f);

    Protocol::load().define(pack);
}
