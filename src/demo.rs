use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{HookError, Result};
use crate::logic::hooks::{Hook, HookSet, Operation};
use crate::logic::{describe, run_batch, WriteOp};
use crate::model::{to_object, FieldDescriptor, FieldType, Record, RequestContext};
use crate::store::traits::Store;

/// Demo record served by the `autocrud` binary under `/people`
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPerson {
    pub name: String,
    #[serde(default)]
    pub age: i64,
    #[serde(default)]
    pub email: String,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersonChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Record for Person {
    const COLLECTION: &'static str = "people";

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("id", FieldType::Integer).identifier(),
            FieldDescriptor::new("name", FieldType::Text).column("full_name"),
            FieldDescriptor::new("age", FieldType::Integer),
            FieldDescriptor::new("email", FieldType::Text),
        ]
    }

    fn hooks(hooks: &mut HookSet<Self>) {
        hooks
            .on(
                Operation::Create,
                Hook::bind(|person: &mut Person, input: NewPerson| {
                    person.name = input.name.to_uppercase();
                    person.age = input.age * 10;
                    person.email = input.email.to_lowercase();
                }),
            )
            .on(
                Operation::Update,
                Hook::transform_with_context(|ctx: &RequestContext, changes: PersonChanges| {
                    if changes.age.is_some_and(|age| age < 0) {
                        return Err(HookError::new(format!(
                            "age must not be negative (request {})",
                            ctx.request_id
                        )));
                    }
                    Ok(changes)
                }),
            );
    }
}

fn seed_people() -> Vec<Person> {
    [
        ("Ada Lovelace", 36, "ada@example.com"),
        ("Alan Turing", 41, "alan@example.com"),
        ("Grace Hopper", 85, "grace@example.com"),
    ]
    .into_iter()
    .map(|(name, age, email)| Person {
        name: name.to_string(),
        age,
        email: email.to_string(),
        ..Default::default()
    })
    .collect()
}

/// Insert the demo people as-is, without running the create hook
pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<()> {
    let schema = describe::<Person>()?;
    let people = seed_people();
    let ops = people
        .iter()
        .map(|person| to_object(person).map(|object| WriteOp::Insert(schema.to_row(&object))));
    let outcome = run_batch(store, &schema, ops).await?;
    info!("Seeded {} people", outcome.affected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_bypasses_hooks() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        let rows = store.rows("people");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["full_name"], "Ada Lovelace");
        assert_eq!(rows[0]["age"], 36);
    }
}
