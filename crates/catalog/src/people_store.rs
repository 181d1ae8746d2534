use crate::error::{CatalogError, Result};
use crate::types::{FaceDetection, Person};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PeopleLedger {
    pub(crate) faces: BTreeMap<u64, FaceDetection>,
    pub(crate) persons: BTreeMap<u64, Person>,
    pub(crate) next_person_id: u64,
    pub(crate) next_label_seq: u64,
}

impl Default for PeopleLedger {
    fn default() -> Self {
        Self {
            faces: BTreeMap::new(),
            persons: BTreeMap::new(),
            next_person_id: 1,
            next_label_seq: 1,
        }
    }
}

/// Faces and the persons they are grouped into.
///
/// Membership lives on both sides (`FaceDetection::person_id` and
/// `Person::member_face_ids`); keeping both under one lock is what makes the
/// single-membership invariant enforceable. All membership changes go through
/// `assign`/`unassign`/`reassign`; a face is never in two persons at once.
#[derive(Default)]
pub struct PeopleStore {
    ledger: RwLock<PeopleLedger>,
}

impl PeopleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a face record. Membership is managed exclusively by
    /// `assign`/`unassign`: a caller-supplied `person_id` is replaced with the
    /// store's current membership for that face (`None` for new faces).
    pub fn upsert_face(&self, mut face: FaceDetection) {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        face.person_id = ledger.faces.get(&face.id).and_then(|f| f.person_id);
        ledger.faces.insert(face.id, face);
    }

    pub fn face(&self, face_id: u64) -> Result<FaceDetection> {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .faces
            .get(&face_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("face {face_id}")))
    }

    /// All faces in ascending id order.
    #[must_use]
    pub fn faces(&self) -> Vec<FaceDetection> {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .faces
            .values()
            .cloned()
            .collect()
    }

    /// Remove a face, unlinking it from its person first.
    pub fn remove_face(&self, face_id: u64) -> Result<()> {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let face = ledger
            .faces
            .remove(&face_id)
            .ok_or_else(|| CatalogError::NotFound(format!("face {face_id}")))?;
        if let Some(person_id) = face.person_id {
            if let Some(person) = ledger.persons.get_mut(&person_id) {
                person.member_face_ids.retain(|id| *id != face_id);
            }
        }
        Ok(())
    }

    /// Record that a face's stored vector moved to `version`. Returns false
    /// when the face is unknown (the vector may outlive its face record).
    pub fn set_face_vector_version(&self, face_id: u64, version: u32) -> bool {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        match ledger.faces.get_mut(&face_id) {
            Some(face) => {
                face.vector_version = version;
                true
            }
            None => false,
        }
    }

    pub fn create_person(&self, label: &str) -> Person {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let id = ledger.next_person_id;
        ledger.next_person_id += 1;
        let person = Person {
            id,
            label: label.to_string(),
            member_face_ids: Vec::new(),
        };
        ledger.persons.insert(id, person.clone());
        person
    }

    /// Create a person with the next sequential label: `Person 1`,
    /// `Person 2`, and so on. The sequence never reuses a number, even after
    /// deletions.
    pub fn create_numbered_person(&self) -> Person {
        let label = {
            let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
            let seq = ledger.next_label_seq;
            ledger.next_label_seq += 1;
            format!("Person {seq}")
        };
        self.create_person(&label)
    }

    pub fn person(&self, person_id: u64) -> Result<Person> {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .persons
            .get(&person_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("person {person_id}")))
    }

    /// All persons in ascending id order.
    #[must_use]
    pub fn persons(&self) -> Vec<Person> {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .persons
            .values()
            .cloned()
            .collect()
    }

    /// Put a face into a person. A face already in a different person is
    /// rejected; moving it requires `reassign` (or an explicit `unassign`).
    /// Assigning a face to the person it is already in is a no-op.
    pub fn assign(&self, face_id: u64, person_id: u64) -> Result<()> {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        if !ledger.persons.contains_key(&person_id) {
            return Err(CatalogError::NotFound(format!("person {person_id}")));
        }
        let current = ledger
            .faces
            .get(&face_id)
            .ok_or_else(|| CatalogError::NotFound(format!("face {face_id}")))?
            .person_id;

        match current {
            Some(existing) if existing == person_id => return Ok(()),
            Some(existing) => {
                return Err(CatalogError::DuplicateAssignment {
                    face_id,
                    current_person_id: existing,
                });
            }
            None => {}
        }

        if let Some(face) = ledger.faces.get_mut(&face_id) {
            face.person_id = Some(person_id);
        }
        if let Some(person) = ledger.persons.get_mut(&person_id) {
            person.member_face_ids.push(face_id);
        }
        Ok(())
    }

    /// Take a face out of its person, if any. Returns the prior person id.
    pub fn unassign(&self, face_id: u64) -> Result<Option<u64>> {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let prior = ledger
            .faces
            .get(&face_id)
            .ok_or_else(|| CatalogError::NotFound(format!("face {face_id}")))?
            .person_id;

        if let Some(person_id) = prior {
            if let Some(face) = ledger.faces.get_mut(&face_id) {
                face.person_id = None;
            }
            if let Some(person) = ledger.persons.get_mut(&person_id) {
                person.member_face_ids.retain(|id| *id != face_id);
            }
        }
        Ok(prior)
    }

    /// Move a face into a person, removing it from its prior person first.
    pub fn reassign(&self, face_id: u64, person_id: u64) -> Result<()> {
        let current = self.face(face_id)?.person_id;
        if current == Some(person_id) {
            return Ok(());
        }
        self.unassign(face_id)?;
        self.assign(face_id, person_id)
    }

    /// Delete a person. Member faces get their `person_id` cleared, never
    /// left pointing at a missing person. Returns how many faces were
    /// unlinked.
    pub fn delete_person(&self, person_id: u64) -> Result<usize> {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let person = ledger
            .persons
            .remove(&person_id)
            .ok_or_else(|| CatalogError::NotFound(format!("person {person_id}")))?;
        let mut cleared = 0;
        for face_id in &person.member_face_ids {
            if let Some(face) = ledger.faces.get_mut(face_id) {
                face.person_id = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Cleanup routine: delete persons whose membership dropped to zero.
    /// Returns the removed person ids.
    pub fn prune_empty_persons(&self) -> Vec<u64> {
        let mut ledger = self.ledger.write().unwrap_or_else(PoisonError::into_inner);
        let empty: Vec<u64> = ledger
            .persons
            .values()
            .filter(|person| person.member_face_ids.is_empty())
            .map(|person| person.id)
            .collect();
        for id in &empty {
            ledger.persons.remove(id);
        }
        if !empty.is_empty() {
            log::debug!("Pruned {} empty persons", empty.len());
        }
        empty
    }

    #[must_use]
    pub fn face_count(&self) -> usize {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .faces
            .len()
    }

    #[must_use]
    pub fn person_count(&self) -> usize {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .persons
            .len()
    }

    pub(crate) fn dump(&self) -> PeopleLedger {
        self.ledger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn restore(ledger: PeopleLedger) -> Self {
        Self {
            ledger: RwLock::new(ledger),
        }
    }
}
