use shared::Student;
use std::collections::HashMap;
use std::path::Path;

/// Enrolled students keyed by Discord user id
#[derive(Debug, Clone, Default)]
pub struct Roster {
    students: HashMap<u64, Student>,
}

impl Roster {
    /// Load the students file. Errors are logged and yield an empty roster.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Could not read students file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(roster) => {
                tracing::info!("Loaded {} student(s) from {}", roster.len(), path.display());
                roster
            }
            Err(e) => {
                tracing::warn!("Invalid students file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)?;

        let mut students = HashMap::with_capacity(raw.len());
        for (id, record) in raw {
            let Ok(user_id) = id.trim().parse::<u64>() else {
                tracing::warn!("Skipping student with invalid Discord id '{}'", id);
                continue;
            };
            match serde_json::from_value::<Student>(record) {
                Ok(student) => {
                    students.insert(user_id, student);
                }
                Err(e) => tracing::warn!("Skipping invalid student record for '{}': {}", id, e),
            }
        }

        Ok(Self { students })
    }

    pub fn get(&self, user_id: u64) -> Option<&Student> {
        self.students.get(&user_id)
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.students.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}
