//! Lists and mappings of parameters, loaded as a single app

use crate::app::App;
use crate::attribute::ValueSink;
use crate::parameter::{ParamId, Parameter};
use crate::value::{FieldKey, Segment};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One node of a collection tree
#[derive(Debug, Clone)]
pub enum Item {
    /// A parameter, replaced by its value once loaded
    Param {
        param: Arc<Parameter>,
        value: Option<Value>,
    },
    /// A literal that is left as is
    Value(Value),
    List(Vec<Item>),
    Map(BTreeMap<String, Item>),
}

impl Item {
    pub fn param(param: Arc<Parameter>) -> Self {
        Self::Param { param, value: None }
    }

    fn walk(&self, path: &mut Vec<Segment>, out: &mut Vec<(FieldKey, Arc<Parameter>)>) {
        match self {
            Self::Param { param, .. } => out.push((FieldKey::Path(path.clone()), Arc::clone(param))),
            Self::Value(_) => {}
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    path.push(Segment::Index(i));
                    item.walk(path, out);
                    path.pop();
                }
            }
            Self::Map(items) => {
                for (key, item) in items {
                    path.push(Segment::Key(key.clone()));
                    item.walk(path, out);
                    path.pop();
                }
            }
        }
    }

    fn at_mut(&mut self, path: &[Segment]) -> Option<&mut Item> {
        let Some((head, rest)) = path.split_first() else {
            return Some(self);
        };
        let child = match (self, head) {
            (Self::List(items), Segment::Index(i)) => items.get_mut(*i)?,
            (Self::Map(items), Segment::Key(key)) => items.get_mut(key)?,
            _ => return None,
        };
        child.at_mut(rest)
    }

    fn to_value(&self) -> Result<Value> {
        match self {
            Self::Param { value: Some(value), .. } => Ok(value.clone()),
            Self::Param { param, value: None } => Err(Error::usage(format!(
                "{} in collection has no value; did you forget to call load()?",
                param.describe()
            ))),
            Self::Value(value) => Ok(value.clone()),
            Self::List(items) => items
                .iter()
                .map(Item::to_value)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Self::Map(items) => items
                .iter()
                .map(|(k, item)| Ok((k.clone(), item.to_value()?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
        }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Arc<Parameter>> for Item {
    fn from(param: Arc<Parameter>) -> Self {
        Self::param(param)
    }
}

/// An app whose parameters are the leaves of a list or mapping.
///
/// Each parameter leaf is addressed by its path, e.g. `[0]["port"]`.
#[derive(Debug)]
pub struct Collection {
    root: RefCell<Item>,
}

impl Collection {
    pub fn new(root: Item) -> Self {
        Self {
            root: RefCell::new(root),
        }
    }

    pub fn list(items: impl IntoIterator<Item = Item>) -> Self {
        Self::new(Item::List(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(items: impl IntoIterator<Item = (K, Item)>) -> Self {
        Self::new(Item::Map(
            items.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// True if the root is a list or mapping
    pub fn is_container(&self) -> bool {
        matches!(&*self.root.borrow(), Item::List(_) | Item::Map(_))
    }

    /// Render the tree with every parameter replaced by its value
    pub fn to_value(&self) -> Result<Value> {
        self.root.borrow().to_value()
    }

    fn slot<R>(&self, key: &FieldKey, f: impl FnOnce(&mut Option<Value>) -> R) -> Result<R> {
        let FieldKey::Path(path) = key else {
            return Err(Error::usage(format!(
                "collections are addressed by path, not by field name '{}'",
                key
            )));
        };
        let mut root = self.root.borrow_mut();
        match root.at_mut(path) {
            Some(Item::Param { value, .. }) => Ok(f(value)),
            _ => Err(Error::usage(format!("no parameter at {} in collection", key))),
        }
    }
}

impl App for Collection {
    fn parameters(&self) -> Result<Vec<(FieldKey, Arc<Parameter>)>> {
        let mut params = Vec::new();
        self.root.borrow().walk(&mut Vec::new(), &mut params);

        let mut seen = std::collections::HashSet::new();
        for (key, param) in &params {
            if !seen.insert(ParamId::of(param)) {
                return Err(Error::usage(format!(
                    "{} appears more than once in collection (again at {})",
                    param.describe(),
                    key
                )));
            }
        }
        Ok(params)
    }

    fn store(&self) -> &dyn ValueSink {
        self
    }

    fn type_name(&self) -> &'static str {
        "collection"
    }
}

impl ValueSink for Collection {
    fn set_value(&self, key: &FieldKey, value: Value) -> Result<()> {
        self.slot(key, |slot| *slot = Some(value))
    }

    fn delete_value(&self, key: &FieldKey) -> Result<()> {
        self.slot(key, |slot| *slot = None)
    }
}
