//! Scope frame stack (spec §3 "Scope frame") and the `Value` type.
//!
//! Name resolution walks top-to-bottom; `local` binds in the current
//! frame; a plain assignment mutates the nearest enclosing frame that
//! already defines the name, else the global (bottom) frame.

use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Attrs {
    pub exported: bool,
    pub readonly: bool,
    pub integer: bool,
    pub lowercase: bool,
    pub uppercase: bool,
    pub nameref: bool,
}

#[derive(Debug, Clone)]
pub enum Value {
    Scalar(String),
    Indexed(IndexMap<i64, String>),
    Assoc(IndexMap<String, String>),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub attrs: Attrs,
}

impl Variable {
    pub fn scalar(s: impl Into<String>) -> Self {
        Variable { value: Value::Scalar(s.into()), attrs: Attrs::default() }
    }

    pub fn as_scalar(&self) -> String {
        match &self.value {
            Value::Scalar(s) => s.clone(),
            Value::Indexed(m) => m.get(&0).cloned().unwrap_or_default(),
            Value::Assoc(m) => m.values().next().cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub vars: IndexMap<String, Variable>,
    /// Names declared `local` in this frame (distinct from merely being
    /// present, so a nested function call can shadow without leaking).
    pub locals: HashSet<String>,
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack { frames: vec![Frame::default()] }
    }
}

impl ScopeStack {
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn global_mut(&mut self) -> &mut Frame {
        self.frames.first_mut().unwrap()
    }

    fn find_frame_idx(&self, name: &str) -> Option<usize> {
        self.frames.iter().rposition(|f| f.vars.contains_key(name))
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.find_frame_idx(name).map(|i| self.frames[i].vars.get(name).unwrap())
    }

    pub fn get_scalar(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.as_scalar())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.find_frame_idx(name).is_some()
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.get(name).map(|v| v.attrs.readonly).unwrap_or(false)
    }

    /// `local NAME[=value]` — binds in the current (top) frame.
    pub fn declare_local(&mut self, name: &str, initial: Option<Value>) {
        let top = self.frames.last_mut().unwrap();
        top.locals.insert(name.to_string());
        match (top.vars.get_mut(name), initial) {
            (Some(var), Some(v)) => var.value = v,
            (Some(_), None) => {}
            (None, v) => {
                top.vars.insert(name.to_string(), Variable { value: v.unwrap_or_else(|| Value::Scalar(String::new())), attrs: Attrs::default() });
            }
        }
    }

    /// Assignment without `local`: mutate nearest enclosing frame that
    /// already defines the name, else the global frame.
    pub fn set_scalar(&mut self, name: &str, value: String) {
        if let Some(idx) = self.find_frame_idx(name) {
            let var = self.frames[idx].vars.get_mut(name).unwrap();
            var.value = Value::Scalar(value);
        } else {
            self.global_mut().vars.insert(name.to_string(), Variable::scalar(value));
        }
    }

    pub fn set_scalar_in_current(&mut self, name: &str, value: String) {
        let top = self.frames.last_mut().unwrap();
        match top.vars.get_mut(name) {
            Some(v) => v.value = Value::Scalar(value),
            None => {
                top.vars.insert(name.to_string(), Variable::scalar(value));
            }
        }
    }

    pub fn get_array_element(&self, name: &str, index: i64) -> Option<String> {
        match &self.get(name)?.value {
            Value::Indexed(m) => m.get(&index).cloned(),
            Value::Scalar(s) if index == 0 => Some(s.clone()),
            _ => None,
        }
    }

    pub fn set_array_element(&mut self, name: &str, index: i64, value: String) {
        let idx = self.find_frame_idx(name);
        let frame = match idx {
            Some(i) => &mut self.frames[i],
            None => self.global_mut(),
        };
        let var = frame.vars.entry(name.to_string()).or_insert_with(|| Variable {
            value: Value::Indexed(IndexMap::new()),
            attrs: Attrs::default(),
        });
        match &mut var.value {
            Value::Indexed(m) => {
                m.insert(index, value);
            }
            Value::Scalar(s) => {
                let mut m = IndexMap::new();
                if index != 0 {
                    m.insert(0, std::mem::take(s));
                }
                m.insert(index, value);
                var.value = Value::Indexed(m);
            }
            Value::Assoc(_) => {}
        }
    }

    pub fn set_assoc_element(&mut self, name: &str, key: &str, value: String) {
        let idx = self.find_frame_idx(name);
        let frame = match idx {
            Some(i) => &mut self.frames[i],
            None => self.global_mut(),
        };
        let var = frame.vars.entry(name.to_string()).or_insert_with(|| Variable {
            value: Value::Assoc(IndexMap::new()),
            attrs: Attrs::default(),
        });
        if let Value::Assoc(m) = &mut var.value {
            m.insert(key.to_string(), value);
        }
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        if let Some(idx) = self.find_frame_idx(name) {
            self.frames[idx].vars.get_mut(name).unwrap().value = value;
        } else {
            self.global_mut().vars.insert(name.to_string(), Variable { value, attrs: Attrs::default() });
        }
    }

    pub fn unset(&mut self, name: &str) {
        if let Some(idx) = self.find_frame_idx(name) {
            self.frames[idx].vars.shift_remove(name);
        }
    }

    pub fn set_attrs(&mut self, name: &str, f: impl FnOnce(&mut Attrs)) {
        if self.find_frame_idx(name).is_none() {
            self.global_mut().vars.insert(name.to_string(), Variable::scalar(String::new()));
        }
        let idx = self.find_frame_idx(name).unwrap();
        f(&mut self.frames[idx].vars.get_mut(name).unwrap().attrs);
    }

    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for frame in &self.frames {
            for k in frame.vars.keys() {
                if !names.contains(k) {
                    names.push(k.clone());
                }
            }
        }
        names
    }

    /// Copy-construct a subshell scope: flat snapshot of all visible
    /// bindings in a single frame, so writes inside never escape (spec §4.4
    /// "Subshell"). Functions/exported env are logically inherited by the
    /// caller keeping its own table; this clone simply starts independent.
    pub fn snapshot_for_subshell(&self) -> ScopeStack {
        let mut merged = IndexMap::new();
        for frame in &self.frames {
            for (k, v) in &frame.vars {
                merged.insert(k.clone(), v.clone());
            }
        }
        ScopeStack { frames: vec![Frame { vars: merged, locals: HashSet::new() }] }
    }
}
