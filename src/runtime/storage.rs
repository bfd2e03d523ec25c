use std::fmt;
use std::str::FromStr;

use crate::lexer::cursor::Cursor;
use crate::symbol::{fx_map, FxMap};

/// The subset of NBT tags the generated commands produce.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Nbt {
    Int(i32),
    List(Vec<Nbt>),
    Compound(FxMap<String, Nbt>),
}

impl Nbt {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Nbt::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Nbt]> {
        match self {
            Nbt::List(items) => Some(items),
            _ => None,
        }
    }

    /// What `data get` reports: the value of an int, the size of anything else.
    pub fn get_result(&self) -> i32 {
        match self {
            Nbt::Int(v) => *v,
            Nbt::List(items) => items.len() as i32,
            Nbt::Compound(map) => map.len() as i32,
        }
    }
}

impl fmt::Display for Nbt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nbt::Int(v) => write!(f, "{v}"),
            Nbt::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Nbt::Compound(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl FromStr for Nbt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cur = Cursor::new(s);
        let value = parse_value(&mut cur)?;
        skip_ws(&mut cur);
        if !cur.is_eof() {
            return Err(format!("trailing input `{}` in SNBT", cur.as_str()));
        }
        Ok(value)
    }
}

fn skip_ws(cur: &mut Cursor) {
    cur.take_while(char::is_whitespace);
}

fn parse_value(cur: &mut Cursor) -> Result<Nbt, String> {
    skip_ws(cur);
    match cur.first() {
        '[' => {
            cur.bump();
            let mut items = Vec::new();
            skip_ws(cur);
            if cur.first() == ']' {
                cur.bump();
                return Ok(Nbt::List(items));
            }
            loop {
                items.push(parse_value(cur)?);
                skip_ws(cur);
                match cur.bump() {
                    Some(',') => continue,
                    Some(']') => return Ok(Nbt::List(items)),
                    _ => return Err("expected `,` or `]` in SNBT list".to_string()),
                }
            }
        }
        '{' => {
            cur.bump();
            let mut map = fx_map();
            skip_ws(cur);
            if cur.first() == '}' {
                cur.bump();
                return Ok(Nbt::Compound(map));
            }
            loop {
                skip_ws(cur);
                let key = take_key(cur);
                if key.is_empty() {
                    return Err("expected a key in SNBT compound".to_string());
                }
                skip_ws(cur);
                if cur.bump() != Some(':') {
                    return Err(format!("expected `:` after key `{key}`"));
                }
                let value = parse_value(cur)?;
                map.insert(key.to_string(), value);
                skip_ws(cur);
                match cur.bump() {
                    Some(',') => continue,
                    Some('}') => return Ok(Nbt::Compound(map)),
                    _ => return Err("expected `,` or `}` in SNBT compound".to_string()),
                }
            }
        }
        _ => {
            let rest = cur.as_str();
            if cur.first() == '-' {
                cur.bump();
            }
            cur.take_while(|c| c.is_ascii_digit());
            let len = rest.len() - cur.as_str().len();
            let int = rest[..len]
                .parse()
                .map_err(|_| format!("invalid SNBT value `{rest}`"))?;
            // Explicit int suffix
            if matches!(cur.first(), 'i' | 'I') {
                cur.bump();
            }
            Ok(Nbt::Int(int))
        }
    }
}

fn take_key<'a>(cur: &mut Cursor<'a>) -> &'a str {
    let rest = cur.as_str();
    cur.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    &rest[..rest.len() - cur.as_str().len()]
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PathSeg {
    Key(String),
    /// Negative indices count from the back
    Index(i32),
}

/// NBT path such as `mem[0][0].v`. Always starts with a key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct NbtPath {
    segs: Vec<PathSeg>,
}

impl NbtPath {
    pub fn segs(&self) -> &[PathSeg] {
        &self.segs
    }
}

impl fmt::Display for NbtPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segs.iter().enumerate() {
            match seg {
                PathSeg::Key(key) if i == 0 => f.write_str(key)?,
                PathSeg::Key(key) => write!(f, ".{key}")?,
                PathSeg::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for NbtPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cur = Cursor::new(s);
        let mut segs = Vec::new();
        let root = take_key(&mut cur);
        if root.is_empty() {
            return Err(format!("path `{s}` must start with a key"));
        }
        segs.push(PathSeg::Key(root.to_string()));
        while let Some(c) = cur.bump() {
            match c {
                '.' => {
                    let key = take_key(&mut cur);
                    if key.is_empty() {
                        return Err(format!("empty key in path `{s}`"));
                    }
                    segs.push(PathSeg::Key(key.to_string()));
                }
                '[' => {
                    let rest = cur.as_str();
                    cur.take_while(|c| c != ']');
                    let idx = &rest[..rest.len() - cur.as_str().len()];
                    if cur.bump() != Some(']') {
                        return Err(format!("unclosed index in path `{s}`"));
                    }
                    let idx = idx
                        .parse()
                        .map_err(|_| format!("invalid index `{idx}` in path `{s}`"))?;
                    segs.push(PathSeg::Index(idx));
                }
                _ => return Err(format!("unexpected `{c}` in path `{s}`")),
            }
        }
        Ok(NbtPath { segs })
    }
}

fn resolve_index(idx: i32, len: usize) -> Option<usize> {
    if idx >= 0 {
        let idx = idx as usize;
        (idx < len).then_some(idx)
    } else {
        let back = idx.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    }
}

fn step<'n>(node: &'n Nbt, seg: &PathSeg) -> Option<&'n Nbt> {
    match (node, seg) {
        (Nbt::Compound(map), PathSeg::Key(key)) => map.get(key),
        (Nbt::List(items), PathSeg::Index(idx)) => items.get(resolve_index(*idx, items.len())?),
        _ => None,
    }
}

fn step_mut<'n>(node: &'n mut Nbt, seg: &PathSeg) -> Option<&'n mut Nbt> {
    match (node, seg) {
        (Nbt::Compound(map), PathSeg::Key(key)) => map.get_mut(key),
        (Nbt::List(items), PathSeg::Index(idx)) => {
            let idx = resolve_index(*idx, items.len())?;
            items.get_mut(idx)
        }
        _ => None,
    }
}

/// Command storage: one root compound per storage id.
#[derive(Clone, Debug, Default)]
pub struct Storage {
    roots: FxMap<String, FxMap<String, Nbt>>,
}

impl Storage {
    pub fn new() -> Self {
        Storage { roots: fx_map() }
    }

    pub fn get(&self, id: &str, path: &NbtPath) -> Option<&Nbt> {
        let (first, rest) = split_root(path)?;
        let mut node = self.roots.get(id)?.get(first)?;
        for seg in rest {
            node = step(node, seg)?;
        }
        Some(node)
    }

    pub fn get_mut(&mut self, id: &str, path: &NbtPath) -> Option<&mut Nbt> {
        let (first, rest) = split_root(path)?;
        let mut node = self.roots.get_mut(id)?.get_mut(first)?;
        for seg in rest {
            node = step_mut(node, seg)?;
        }
        Some(node)
    }

    /// Write `value` at `path`. Keys are created in an existing compound,
    /// list elements must already exist.
    pub fn set(&mut self, id: &str, path: &NbtPath, value: Nbt) -> bool {
        let Some((last, parent)) = path.segs.split_last() else {
            return false;
        };
        if parent.is_empty() {
            let PathSeg::Key(key) = last else {
                return false;
            };
            self.roots
                .entry(id.to_string())
                .or_insert_with(fx_map)
                .insert(key.clone(), value);
            return true;
        }
        let parent = NbtPath {
            segs: parent.to_vec(),
        };
        match (self.get_mut(id, &parent), last) {
            (Some(Nbt::Compound(map)), PathSeg::Key(key)) => {
                map.insert(key.clone(), value);
                true
            }
            (Some(Nbt::List(items)), PathSeg::Index(idx)) => {
                match resolve_index(*idx, items.len()) {
                    Some(idx) => {
                        items[idx] = value;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: &str, path: &NbtPath) -> bool {
        let Some((last, parent)) = path.segs.split_last() else {
            return false;
        };
        if parent.is_empty() {
            let PathSeg::Key(key) = last else {
                return false;
            };
            return self
                .roots
                .get_mut(id)
                .and_then(|root| root.shift_remove(key))
                .is_some();
        }
        let parent = NbtPath {
            segs: parent.to_vec(),
        };
        match (self.get_mut(id, &parent), last) {
            (Some(Nbt::Compound(map)), PathSeg::Key(key)) => map.shift_remove(key).is_some(),
            (Some(Nbt::List(items)), PathSeg::Index(idx)) => {
                match resolve_index(*idx, items.len()) {
                    Some(idx) => {
                        items.remove(idx);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }
}

fn split_root(path: &NbtPath) -> Option<(&str, &[PathSeg])> {
    match path.segs.split_first()? {
        (PathSeg::Key(key), rest) => Some((key.as_str(), rest)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> NbtPath {
        s.parse().unwrap()
    }

    #[test]
    fn snbt_parses_nested_values() {
        let nbt: Nbt = "[[{a:2,v:-7}],[]]".parse().unwrap();
        assert_eq!(nbt.to_string(), "[[{a:2,v:-7}],[]]");
        assert_eq!(nbt.get_result(), 2);
        let nbt: Nbt = "{ }".parse().unwrap();
        assert_eq!(nbt, Nbt::Compound(fx_map()));
        assert!("[1,".parse::<Nbt>().is_err());
        assert!("[1] x".parse::<Nbt>().is_err());
    }

    #[test]
    fn paths_round_trip() {
        for s in ["mem", "mem[0][0].v", "mem_tmp[-1]", "a.b[3]"] {
            assert_eq!(path(s).to_string(), s);
        }
        assert!("[0]".parse::<NbtPath>().is_err());
        assert!("mem[x]".parse::<NbtPath>().is_err());
    }

    #[test]
    fn set_get_remove() {
        let mut storage = Storage::new();
        assert!(storage.set("elvm:elvm", &path("mem"), "[[],[{a:1,v:2}]]".parse().unwrap()));
        assert_eq!(
            storage.get("elvm:elvm", &path("mem[1][0].v")),
            Some(&Nbt::Int(2))
        );
        assert_eq!(
            storage.get("elvm:elvm", &path("mem[-1][-1].a")),
            Some(&Nbt::Int(1))
        );
        assert!(storage.get("elvm:elvm", &path("mem[0][0]")).is_none());
        assert!(storage.set("elvm:elvm", &path("mem[1][0].v"), Nbt::Int(9)));
        assert!(!storage.set("elvm:elvm", &path("mem[0][0].v"), Nbt::Int(9)));
        assert!(storage.remove("elvm:elvm", &path("mem[0]")));
        assert_eq!(storage.get("elvm:elvm", &path("mem")).unwrap().to_string(), "[[{a:1,v:9}]]");
        assert!(!storage.remove("elvm:elvm", &path("mem[4]")));
        assert!(storage.get("other:id", &path("mem")).is_none());
    }
}
