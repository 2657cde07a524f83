//! Lua 5.4 script runtime.
//!
//! Every call gets a fresh interpreter with only the `string`, `table` and
//! `math` libraries loaded, so scripts cannot reach the host or keep state
//! between documents. Each call also has a memory cap and an instruction
//! budget; `pcall`, `xpcall` and `load` are removed so a script cannot catch
//! the budget error and keep running.
//!
//! Map scripts see:
//!
//! - `doc`: the child document. Every node is a table; a node's own value is
//!   under `_val`, and `doc._id` is the child key
//! - `key` and `_key`: the child key
//! - `emit(seg1, ..., segN, value)`: add a row at `seg1/.../segN`. String
//!   segments are used as-is, anything else is collation-encoded so numbers
//!   and booleans sort by value. A table whose encoding contains `/` fails
//!   the script
//!
//! Reduce scripts see `directive` (`"add"` or `"remove"`), `key`, `current`
//! and `row = { path = {...}, value = ... }`, and return the new value.
//! `current` and `row.value` are plain scalars when they hold only a value and
//! `nil` when empty.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Table, Value, Variadic, VmState};
use serde_json::{Map, Number};

use super::{Directive, EmittedRow, ScriptError, ScriptRuntime};
use crate::{
    Leaf, Path, Tree,
    collate::to_indexable,
    constants::{REV, SEPARATOR, VALUE},
    store::DEFAULT_INSTRUCTION_LIMIT,
};

/// Upper bound on interpreter memory per call.
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;
/// Instructions between two budget checks.
const HOOK_INTERVAL: u32 = 1000;
const ID: &str = "_id";
/// Base functions able to catch errors or compile code at run time.
const REMOVED_GLOBALS: [&str; 6] = ["pcall", "xpcall", "load", "loadfile", "dofile", "collectgarbage"];

/// The default [`ScriptRuntime`].
#[derive(Debug, Clone, Copy)]
pub struct LuaRuntime {
    instruction_limit: u64,
}

impl Default for LuaRuntime {
    fn default() -> Self {
        Self::with_instruction_limit(DEFAULT_INSTRUCTION_LIMIT)
    }
}

/// An interpreter for one call, and whether it ran out of instructions.
struct Sandbox {
    lua: Lua,
    exhausted: Arc<AtomicBool>,
    instruction_limit: u64,
}

impl Sandbox {
    fn error(&self, err: mlua::Error) -> ScriptError {
        if self.exhausted.load(Ordering::Relaxed) {
            ScriptError::BudgetExceeded {
                instructions: self.instruction_limit,
            }
        } else {
            script_error(err)
        }
    }
}

impl LuaRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime that aborts any call running more than `limit` instructions.
    ///
    /// The budget is checked every thousand instructions.
    pub fn with_instruction_limit(limit: u64) -> Self {
        Self {
            instruction_limit: limit.max(1),
        }
    }

    pub fn instruction_limit(&self) -> u64 {
        self.instruction_limit
    }

    fn sandbox(&self) -> Result<Sandbox, ScriptError> {
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::TABLE | StdLib::MATH,
            LuaOptions::default(),
        )
        .map_err(script_error)?;
        lua.set_memory_limit(MEMORY_LIMIT).map_err(script_error)?;

        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals.set(name, Value::Nil).map_err(script_error)?;
        }

        let exhausted = Arc::new(AtomicBool::new(false));
        let flag = exhausted.clone();
        let max_checks = self.instruction_limit.div_ceil(u64::from(HOOK_INTERVAL));
        let checks = AtomicU64::new(0);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
            move |_, _| {
                if checks.fetch_add(1, Ordering::Relaxed) + 1 >= max_checks {
                    flag.store(true, Ordering::Relaxed);
                    return Err(mlua::Error::runtime("instruction budget exhausted"));
                }
                Ok(VmState::Continue)
            },
        );

        Ok(Sandbox {
            lua,
            exhausted,
            instruction_limit: self.instruction_limit,
        })
    }
}

impl ScriptRuntime for LuaRuntime {
    fn map(&self, source: &str, doc: &Tree, key: &str) -> Result<Vec<EmittedRow>, ScriptError> {
        let sandbox = self.sandbox()?;
        let lua = &sandbox.lua;
        let rows = Arc::new(Mutex::new(Vec::new()));

        let setup = || -> mlua::Result<()> {
            let globals = lua.globals();
            let doc_table = document_table(lua, doc)?;
            doc_table.set(ID, key)?;
            globals.set("doc", doc_table)?;
            globals.set("key", key)?;
            globals.set("_key", key)?;

            let sink = rows.clone();
            let emit = lua.create_function(move |_, args: Variadic<Value>| {
                let row = emitted_row(args)?;
                sink.lock()
                    .map_err(|_| mlua::Error::runtime("row buffer poisoned"))?
                    .push(row);
                Ok(())
            })?;
            globals.set("emit", emit)?;
            Ok(())
        };
        setup().map_err(script_error)?;

        lua.load(source)
            .set_name("map")
            .exec()
            .map_err(|err| sandbox.error(err))?;
        drop(sandbox);

        let mut rows = rows.lock().map_err(|_| ScriptError::Runtime {
            reason: "row buffer poisoned".to_string(),
        })?;
        Ok(std::mem::take(&mut *rows))
    }

    fn reduce(
        &self,
        source: &str,
        directive: Directive,
        current: &Tree,
        row: &EmittedRow,
        key: &str,
    ) -> Result<Tree, ScriptError> {
        let sandbox = self.sandbox()?;
        let lua = &sandbox.lua;

        let setup = || -> mlua::Result<()> {
            let globals = lua.globals();
            globals.set("directive", directive.as_str())?;
            globals.set("key", key)?;
            globals.set("current", value_of(lua, current)?)?;

            let path = lua.create_sequence_from(row.path.segments().iter().map(String::as_str))?;
            let row_table = lua.create_table()?;
            row_table.set("path", path)?;
            row_table.set("value", value_of(lua, &row.value)?)?;
            globals.set("row", row_table)?;
            Ok(())
        };
        setup().map_err(script_error)?;

        let result: Value = lua
            .load(source)
            .set_name("reduce")
            .eval()
            .map_err(|err| sandbox.error(err))?;
        match result {
            Value::Nil => Ok(Tree::new()),
            other => tree_from_lua(other).map_err(script_error),
        }
    }
}

fn script_error(err: mlua::Error) -> ScriptError {
    match err {
        mlua::Error::SyntaxError { message, .. } => ScriptError::Compile { reason: message },
        other => ScriptError::Runtime {
            reason: other.to_string(),
        },
    }
}

/// A document node as a table, its value under `_val`.
fn document_table(lua: &Lua, tree: &Tree) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    if let Some(leaf) = leaf_value(lua, &tree.leaf)? {
        table.set(VALUE, leaf)?;
    }
    if let Some(rev) = &tree.rev {
        table.set(REV, rev.as_str())?;
    }
    for (key, branch) in &tree.branches {
        table.set(key.as_str(), document_table(lua, branch)?)?;
    }
    Ok(table)
}

/// A tree as the most compact Lua value: `nil`, a scalar or a table.
fn value_of(lua: &Lua, tree: &Tree) -> mlua::Result<Value> {
    if tree.branches.is_empty() {
        return Ok(leaf_value(lua, &tree.leaf)?.unwrap_or(Value::Nil));
    }
    let table = lua.create_table()?;
    if let Some(leaf) = leaf_value(lua, &tree.leaf)? {
        table.set(VALUE, leaf)?;
    }
    for (key, branch) in &tree.branches {
        table.set(key.as_str(), value_of(lua, branch)?)?;
    }
    Ok(Value::Table(table))
}

fn leaf_value(lua: &Lua, leaf: &Leaf) -> mlua::Result<Option<Value>> {
    Ok(match leaf {
        Leaf::Undefined => None,
        // Lua has no null distinct from nil; a light userdata keeps it apart.
        Leaf::Null => Some(Value::NULL),
        Leaf::Bool(b) => Some(Value::Boolean(*b)),
        Leaf::Number(n) => Some(Value::Number(*n)),
        Leaf::String(s) => Some(Value::String(lua.create_string(s)?)),
    })
}

/// Split `emit` arguments into a row path and value.
fn emitted_row(mut args: Variadic<Value>) -> mlua::Result<EmittedRow> {
    let value = args
        .pop()
        .ok_or_else(|| mlua::Error::runtime("emit needs at least a path segment and a value"))?;
    let mut segments = Vec::with_capacity(args.len());
    for arg in args.iter() {
        segments.push(match arg {
            Value::String(s) => s.to_string_lossy(),
            other => {
                let encoded = to_indexable(&lua_to_json(other)?);
                if encoded.contains(SEPARATOR) {
                    return Err(mlua::Error::runtime(format!(
                        "emitted {} key encodes to a segment containing '{SEPARATOR}'",
                        other.type_name()
                    )));
                }
                encoded
            }
        });
    }
    Ok(EmittedRow {
        path: Path::from_segments(segments),
        value: tree_from_lua(value)?,
    })
}

/// Convert a script result into a tree. Tables become branches, `_val` the leaf.
fn tree_from_lua(value: Value) -> mlua::Result<Tree> {
    let Value::Table(table) = value else {
        return Ok(Tree::from_leaf(leaf_from_lua(&value)?));
    };

    let mut tree = Tree::new();
    for pair in table.pairs::<Value, Value>() {
        let (key, value) = pair?;
        let key = table_key(&key)?;
        if key == VALUE {
            tree.leaf = leaf_from_lua(&value)?;
        } else if key == ID || key == REV {
            continue;
        } else {
            tree.branches.insert(key, tree_from_lua(value)?);
        }
    }
    Ok(tree)
}

fn leaf_from_lua(value: &Value) -> mlua::Result<Leaf> {
    match value {
        Value::Nil => Ok(Leaf::Null),
        Value::LightUserData(ud) if ud.0.is_null() => Ok(Leaf::Null),
        Value::Boolean(b) => Ok(Leaf::Bool(*b)),
        Value::Integer(i) => Ok(Leaf::Number(*i as f64)),
        Value::Number(n) => Ok(Leaf::Number(*n)),
        Value::String(s) => Ok(Leaf::String(s.to_string_lossy().to_string())),
        other => Err(mlua::Error::runtime(format!(
            "cannot store a Lua {} as a value",
            other.type_name()
        ))),
    }
}

fn table_key(key: &Value) -> mlua::Result<String> {
    match key {
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Number(n) if n.fract() == 0.0 => Ok(format!("{n:.0}")),
        other => Err(mlua::Error::runtime(format!(
            "cannot use a Lua {} as a key",
            other.type_name()
        ))),
    }
}

/// Convert a Lua value for collation. Sequences become arrays.
fn lua_to_json(value: &Value) -> mlua::Result<serde_json::Value> {
    Ok(match value {
        Value::Nil => serde_json::Value::Null,
        Value::LightUserData(ud) if ud.0.is_null() => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Number(n) => Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.to_string_lossy().to_string()),
        Value::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut items = Vec::with_capacity(len);
                for i in 1..=len {
                    items.push(lua_to_json(&table.raw_get::<Value>(i)?)?);
                }
                serde_json::Value::Array(items)
            } else {
                let mut object = Map::new();
                for pair in table.clone().pairs::<Value, Value>() {
                    let (key, value) = pair?;
                    object.insert(table_key(&key)?, lua_to_json(&value)?);
                }
                serde_json::Value::Object(object)
            }
        }
        other => {
            return Err(mlua::Error::runtime(format!(
                "cannot use a Lua {} in a row key",
                other.type_name()
            )));
        }
    })
}
