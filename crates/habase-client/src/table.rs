use std::collections::BTreeMap;

use habase_common::protocol::{HabaseError, Result, Value};

use crate::connection::{wire_name, Connection};
use crate::session::{Session, TcpSession};

/// Options of one column family, keyed by snake_case option name
/// (`max_versions`, `time_to_live`, ...).
pub type FamilyOptions = serde_json::Map<String, Value>;

/// Handle on one table, bound to the connection it came from.
pub struct Table<'a, S: Session = TcpSession> {
    name: Vec<u8>,
    connection: &'a Connection<S>,
}

impl<'a, S: Session> Table<'a, S> {
    pub(crate) fn new(name: Vec<u8>, connection: &'a Connection<S>) -> Self {
        Self { name, connection }
    }

    /// Full table name, prefix included
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Column families of this table and their options.
    ///
    /// Family names come back without the trailing `:`.
    pub async fn families(&self) -> Result<BTreeMap<String, FamilyOptions>> {
        let result = self
            .connection
            .dispatch("getColumnDescriptors", &[wire_name(&self.name)?])
            .await?;

        let descriptors = result.as_object().ok_or_else(|| {
            HabaseError::InvalidResponse(format!("getColumnDescriptors returned {}", result))
        })?;

        let mut families = BTreeMap::new();
        for (name, descriptor) in descriptors {
            let descriptor = descriptor.as_object().ok_or_else(|| {
                HabaseError::InvalidResponse(format!("descriptor of {} is {}", name, descriptor))
            })?;

            let options = descriptor
                .iter()
                .map(|(key, value)| (camel_to_snake_case(key), value.clone()))
                .collect();
            families.insert(name.trim_end_matches(':').to_string(), options);
        }

        Ok(families)
    }
}

/// `max_versions` -> `maxVersions`
pub fn snake_to_camel_case(name: &str) -> String {
    let mut camel = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            camel.extend(c.to_uppercase());
            upper = false;
        } else {
            camel.push(c);
        }
    }
    camel
}

/// `maxVersions` -> `max_versions`
pub fn camel_to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_uppercase() {
            snake.push('_');
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}
