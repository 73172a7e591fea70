//! Synthetic patient records for development databases.

use rand::Rng;
use rand::seq::SliceRandom;
use uuid::Uuid;

/// A patient record before the store assigns its `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatientRecord {
    pub name: String,
    pub age: i32,
    pub patient_id: String,
    pub symptoms: Option<String>,
    pub ct_image_file: Option<String>,
    pub image_path: Option<String>,
}

const FIRST_NAMES: &[&str] = &[
    "Ada", "Alan", "Beatrice", "Carlos", "Chen", "Dmitri", "Elena", "Farah", "Grace", "Hiro",
    "Ines", "Jonas", "Kwame", "Leila", "Marta", "Nikhil", "Olga", "Pedro", "Rosa", "Tomas",
];

const LAST_NAMES: &[&str] = &[
    "Adeyemi", "Berg", "Costa", "Dubois", "Evans", "Fischer", "Garcia", "Hansen", "Ito", "Jensen",
    "Kowalski", "Larsen", "Moreau", "Novak", "Okafor", "Petrov", "Rossi", "Silva", "Tanaka", "Weber",
];

const SYMPTOMS: &[&str] = &[
    "cough",
    "fever",
    "headache",
    "fatigue",
    "shortness of breath",
    "chest pain",
    "dizziness",
    "nausea",
    "abdominal pain",
    "back pain",
    "sore throat",
    "loss of appetite",
];

/// Generate `count` records with random names, ages 0..=100, and unique ids.
pub fn generate_records<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<NewPatientRecord> {
    (0..count).map(|_| generate_record(rng)).collect()
}

fn generate_record<R: Rng + ?Sized>(rng: &mut R) -> NewPatientRecord {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Alex");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Doe");

    let symptom_count = rng.gen_range(1..=3);
    let symptoms: Vec<&str> = SYMPTOMS
        .choose_multiple(rng, symptom_count)
        .copied()
        .collect();
    let mut symptoms = symptoms.join(", ");
    if let Some(first_char) = symptoms.get(..1) {
        symptoms = format!("{}{}.", first_char.to_uppercase(), &symptoms[1..]);
    }

    NewPatientRecord {
        name: format!("{} {}", first, last),
        age: rng.gen_range(0..=100),
        patient_id: Uuid::new_v4().to_string(),
        symptoms: Some(symptoms),
        ct_image_file: Some(format!("{}.dcm", Uuid::new_v4())),
        image_path: Some(format!("/data/images/{}.dcm", Uuid::new_v4())),
    }
}
