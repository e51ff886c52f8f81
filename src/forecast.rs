use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Feature order the position model was trained with.
pub const FEATURE_NAMES: [&str; 31] = [
    "sex",
    "age",
    "Medu",
    "Fedu",
    "traveltime",
    "studytime",
    "failures",
    "activities",
    "nursery",
    "higher",
    "internet",
    "freetime",
    "goout",
    "health",
    "absences",
    "G1",
    "G2",
    "is_urban",
    "Mjob_health",
    "Mjob_other",
    "Mjob_services",
    "Mjob_teacher",
    "Fjob_health",
    "Fjob_other",
    "Fjob_services",
    "Fjob_teacher",
    "reason_home",
    "reason_other",
    "reason_reputation",
    "guardian_mother",
    "guardian_other",
];

pub const MIN_POSITION: i64 = 1;
pub const MAX_POSITION: i64 = 20;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    #[error("forecast model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("invalid forecast input: {0}")]
    InvalidInput(String),
    #[error("model returned a non-finite prediction")]
    BadOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Education {
    None,
    #[serde(rename = "Half Matric")]
    HalfMatric,
    Middle,
    Matric,
    Higher,
}

impl Education {
    fn level(self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::HalfMatric => 1.0,
            Self::Middle => 2.0,
            Self::Matric => 3.0,
            Self::Higher => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Job {
    #[serde(rename = "Health care practitioner")]
    Health,
    Teacher,
    #[serde(rename = "In Govt. Services")]
    Services,
    Other,
}

impl Job {
    /// One-hot in model order: health, other, services, teacher.
    fn one_hot(self) -> [f64; 4] {
        match self {
            Self::Health => [1.0, 0.0, 0.0, 0.0],
            Self::Other => [0.0, 1.0, 0.0, 0.0],
            Self::Services => [0.0, 0.0, 1.0, 0.0],
            Self::Teacher => [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    fn flag(self) -> f64 {
        match self {
            Self::Yes => 1.0,
            Self::No => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TravelTime {
    #[serde(rename = "<15 min.")]
    UnderQuarterHour,
    #[serde(rename = "15 to 30 min.")]
    UpToHalfHour,
    #[serde(rename = "30 min. to 1 hour")]
    UpToHour,
    #[serde(rename = ">1 hour")]
    OverHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum StudyTime {
    #[serde(rename = "< 2 hours")]
    UnderTwo,
    #[serde(rename = "2 - 5 hours")]
    TwoToFive,
    #[serde(rename = "5 - 10 hours")]
    FiveToTen,
    #[serde(rename = "> 10 hours")]
    OverTen,
}

/// 1 (very low) to 5 (very high), entered as "1 hour" .. "5 hour".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum HourScale {
    #[serde(rename = "1 hour")]
    One,
    #[serde(rename = "2 hour")]
    Two,
    #[serde(rename = "3 hour")]
    Three,
    #[serde(rename = "4 hour")]
    Four,
    #[serde(rename = "5 hour")]
    Five,
}

impl HourScale {
    fn level(self) -> f64 {
        match self {
            Self::One => 1.0,
            Self::Two => 2.0,
            Self::Three => 3.0,
            Self::Four => 4.0,
            Self::Five => 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Health {
    Weak,
    #[serde(rename = "Slight weak")]
    SlightWeak,
    Average,
    Healthy,
    #[serde(rename = "Very healthy")]
    VeryHealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Reason {
    #[serde(rename = "Near to home")]
    Home,
    #[serde(rename = "School reputation")]
    Reputation,
    Others,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Guardian {
    Mother,
    Father,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Residence {
    Urban,
    Rural,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastForm {
    pub gender: Gender,
    pub age: u32,
    pub mother_education: Education,
    pub father_education: Education,
    pub mother_job: Job,
    pub father_job: Job,
    pub travel_time: TravelTime,
    pub study_time: StudyTime,
    #[serde(default)]
    pub failures: u32,
    pub activities: Answer,
    pub nursery: Answer,
    pub higher: Answer,
    pub internet: Answer,
    pub free_time: HourScale,
    pub go_out: HourScale,
    pub health: Health,
    #[serde(default)]
    pub absences: u32,
    pub first_term_position: i64,
    pub second_term_position: i64,
    pub reason: Reason,
    pub guardian: Guardian,
    pub residence: Residence,
}

/// Relabels a class position between the form's scale (1 = best) and the
/// model's scale (20 = best): 1 and 20 swap, anything else maps to
/// `20 - position`.
pub fn transform_position(position: i64) -> i64 {
    match position {
        1 => 20,
        20 => 1,
        p => 20 - p,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedFeature {
    pub name: &'static str,
    pub value: f64,
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn named(&self) -> Vec<NamedFeature> {
        FEATURE_NAMES
            .iter()
            .zip(&self.values)
            .map(|(&name, &value)| NamedFeature { name, value })
            .collect()
    }
}

fn check_position(field: &str, p: i64) -> Result<(), ForecastError> {
    if (MIN_POSITION..=MAX_POSITION).contains(&p) {
        Ok(())
    } else {
        Err(ForecastError::InvalidInput(format!(
            "{} must be between {} and {}",
            field, MIN_POSITION, MAX_POSITION
        )))
    }
}

pub fn encode_features(form: &ForecastForm) -> Result<FeatureVector, ForecastError> {
    if form.age < 10 {
        return Err(ForecastError::InvalidInput("age must be at least 10".to_string()));
    }
    if form.failures > 10 {
        return Err(ForecastError::InvalidInput(
            "failures must be between 0 and 10".to_string(),
        ));
    }
    check_position("firstTermPosition", form.first_term_position)?;
    check_position("secondTermPosition", form.second_term_position)?;

    let travel = match form.travel_time {
        TravelTime::UnderQuarterHour => 1.0,
        TravelTime::UpToHalfHour => 2.0,
        TravelTime::UpToHour => 3.0,
        TravelTime::OverHour => 4.0,
    };
    let study = match form.study_time {
        StudyTime::UnderTwo => 1.0,
        StudyTime::TwoToFive => 2.0,
        StudyTime::FiveToTen => 3.0,
        StudyTime::OverTen => 4.0,
    };
    let health = match form.health {
        Health::Weak => 1.0,
        Health::SlightWeak => 2.0,
        Health::Average => 3.0,
        Health::Healthy => 4.0,
        Health::VeryHealthy => 5.0,
    };
    let reason = match form.reason {
        Reason::Home => [1.0, 0.0, 0.0],
        Reason::Others => [0.0, 1.0, 0.0],
        Reason::Reputation => [0.0, 0.0, 1.0],
    };
    // No father column in the trained model; father counts as "other".
    let guardian = match form.guardian {
        Guardian::Mother => [1.0, 0.0],
        Guardian::Father | Guardian::Other => [0.0, 1.0],
    };

    let mut values = vec![
        if form.gender == Gender::Male { 1.0 } else { 0.0 },
        f64::from(form.age),
        form.mother_education.level(),
        form.father_education.level(),
        travel,
        study,
        f64::from(form.failures),
        form.activities.flag(),
        form.nursery.flag(),
        form.higher.flag(),
        form.internet.flag(),
        form.free_time.level(),
        form.go_out.level(),
        health,
        f64::from(form.absences),
        transform_position(form.first_term_position) as f64,
        transform_position(form.second_term_position) as f64,
        if form.residence == Residence::Urban { 1.0 } else { 0.0 },
    ];
    values.extend(form.mother_job.one_hot());
    values.extend(form.father_job.one_hot());
    values.extend(reason);
    values.extend(guardian);
    debug_assert_eq!(values.len(), FEATURE_NAMES.len());
    Ok(FeatureVector { values })
}

pub trait PositionModel {
    /// Raw model output on the model's position scale.
    fn predict(&self, features: &FeatureVector) -> Result<f64, ForecastError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearModelFile {
    feature_names: Vec<String>,
    weights: Vec<f64>,
    intercept: f64,
}

/// Linear regressor exported as JSON weights.
#[derive(Debug, Clone)]
pub struct LinearPositionModel {
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearPositionModel {
    pub fn from_json(text: &str) -> Result<Self, ForecastError> {
        let file: LinearModelFile = serde_json::from_str(text)
            .map_err(|e| ForecastError::ModelUnavailable(format!("bad model file: {}", e)))?;
        if file.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(ForecastError::ModelUnavailable(
                "model feature names do not match the expected order".to_string(),
            ));
        }
        if file.weights.len() != FEATURE_NAMES.len() {
            return Err(ForecastError::ModelUnavailable(format!(
                "expected {} weights, found {}",
                FEATURE_NAMES.len(),
                file.weights.len()
            )));
        }
        Ok(Self {
            weights: file.weights,
            intercept: file.intercept,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ForecastError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::ModelUnavailable(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }
}

impl PositionModel for LinearPositionModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64, ForecastError> {
        Ok(self.intercept
            + self
                .weights
                .iter()
                .zip(features.values())
                .map(|(w, x)| w * x)
                .sum::<f64>())
    }
}

/// Runs the model and maps its output back to the form's position scale.
pub fn predict_position(
    model: &dyn PositionModel,
    features: &FeatureVector,
) -> Result<i64, ForecastError> {
    let raw = model.predict(features)?;
    if !raw.is_finite() {
        return Err(ForecastError::BadOutput);
    }
    let rounded = (raw.round() as i64).clamp(MIN_POSITION, MAX_POSITION);
    Ok(transform_position(rounded))
}

/// Process-wide model slot. The first failed load is logged and remembered;
/// forecasting then stays disabled.
#[derive(Default)]
pub enum ModelSlot {
    #[default]
    NotLoaded,
    Ready(Box<dyn PositionModel>),
    Unavailable(String),
}

impl ModelSlot {
    pub fn get_or_load(&mut self, path: Option<&Path>) -> Result<&dyn PositionModel, ForecastError> {
        if let ModelSlot::NotLoaded = self {
            *self = match path {
                None => ModelSlot::Unavailable("no model path configured".to_string()),
                Some(p) => match LinearPositionModel::load(p) {
                    Ok(m) => {
                        tracing::info!(path = %p.display(), "forecast model loaded");
                        ModelSlot::Ready(Box::new(m))
                    }
                    Err(e) => ModelSlot::Unavailable(e.to_string()),
                },
            };
            if let ModelSlot::Unavailable(reason) = self {
                tracing::error!(%reason, "forecasting disabled");
            }
        }
        match self {
            ModelSlot::Ready(m) => Ok(&**m),
            ModelSlot::Unavailable(reason) => Err(ForecastError::ModelUnavailable(reason.clone())),
            ModelSlot::NotLoaded => Err(ForecastError::ModelUnavailable("model not loaded".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_form() -> ForecastForm {
        serde_json::from_value(json!({
            "gender": "Male",
            "age": 15,
            "motherEducation": "Matric",
            "fatherEducation": "Half Matric",
            "motherJob": "Teacher",
            "fatherJob": "In Govt. Services",
            "travelTime": "15 to 30 min.",
            "studyTime": "5 - 10 hours",
            "failures": 1,
            "activities": "yes",
            "nursery": "no",
            "higher": "yes",
            "internet": "yes",
            "freeTime": "3 hour",
            "goOut": "2 hour",
            "health": "Slight weak",
            "absences": 4,
            "firstTermPosition": 5,
            "secondTermPosition": 1,
            "reason": "School reputation",
            "guardian": "Father",
            "residence": "Urban"
        }))
        .expect("form")
    }

    fn feature(fv: &FeatureVector, name: &str) -> Option<f64> {
        fv.named().into_iter().find(|f| f.name == name).map(|f| f.value)
    }

    struct Fixed(f64);

    impl PositionModel for Fixed {
        fn predict(&self, _: &FeatureVector) -> Result<f64, ForecastError> {
            Ok(self.0)
        }
    }

    #[test]
    fn transform_position_round_trip_table() {
        assert_eq!(transform_position(1), 20);
        assert_eq!(transform_position(20), 1);
        let round_trips: Vec<(i64, i64)> = (2..=19)
            .map(|p| (p, transform_position(transform_position(p))))
            .collect();
        let expected: Vec<(i64, i64)> = vec![
            (2, 2),
            (3, 3),
            (4, 4),
            (5, 5),
            (6, 6),
            (7, 7),
            (8, 8),
            (9, 9),
            (10, 10),
            (11, 11),
            (12, 12),
            (13, 13),
            (14, 14),
            (15, 15),
            (16, 16),
            (17, 17),
            (18, 18),
            (19, 20),
        ];
        assert_eq!(round_trips, expected);
        // Not a rank inversion: 1 -> 20 but 2 -> 18, so position 19 is never produced.
        assert_eq!(transform_position(2), 18);
        assert!(!(1..=20).map(transform_position).any(|p| p == 19));
    }

    #[test]
    fn features_follow_model_order() {
        let fv = encode_features(&sample_form()).expect("encode");
        assert_eq!(fv.values().len(), 31);
        assert_eq!(feature(&fv, "sex"), Some(1.0));
        assert_eq!(feature(&fv, "Medu"), Some(3.0));
        assert_eq!(feature(&fv, "Fedu"), Some(1.0));
        assert_eq!(feature(&fv, "traveltime"), Some(2.0));
        assert_eq!(feature(&fv, "studytime"), Some(3.0));
        assert_eq!(feature(&fv, "nursery"), Some(0.0));
        assert_eq!(feature(&fv, "health"), Some(2.0));
        assert_eq!(feature(&fv, "G1"), Some(15.0));
        assert_eq!(feature(&fv, "G2"), Some(20.0));
        assert_eq!(feature(&fv, "Mjob_teacher"), Some(1.0));
        assert_eq!(feature(&fv, "Mjob_other"), Some(0.0));
        assert_eq!(feature(&fv, "Fjob_services"), Some(1.0));
        assert_eq!(feature(&fv, "reason_reputation"), Some(1.0));
        assert_eq!(feature(&fv, "guardian_mother"), Some(0.0));
        assert_eq!(feature(&fv, "guardian_other"), Some(1.0));
        let named = fv.named();
        assert_eq!(named[30].name, "guardian_other");
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut form = sample_form();
        form.first_term_position = 21;
        assert!(matches!(
            encode_features(&form),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn prediction_is_rounded_clamped_and_transformed() {
        let fv = encode_features(&sample_form()).expect("encode");
        assert_eq!(predict_position(&Fixed(17.6), &fv), Ok(2));
        assert_eq!(predict_position(&Fixed(20.0), &fv), Ok(1));
        assert_eq!(predict_position(&Fixed(42.0), &fv), Ok(1));
        assert_eq!(predict_position(&Fixed(-3.0), &fv), Ok(20));
        assert_eq!(predict_position(&Fixed(f64::NAN), &fv), Err(ForecastError::BadOutput));
    }

    #[test]
    fn linear_model_checks_feature_order() {
        let weights = vec![0.0; 31];
        let good = json!({ "featureNames": FEATURE_NAMES, "weights": weights, "intercept": 12.0 });
        let model = LinearPositionModel::from_json(&good.to_string()).expect("model");
        let fv = encode_features(&sample_form()).expect("encode");
        assert_eq!(model.predict(&fv), Ok(12.0));

        let mut names: Vec<&str> = FEATURE_NAMES.to_vec();
        names.swap(0, 1);
        let bad = json!({ "featureNames": names, "weights": vec![0.0; 31], "intercept": 0.0 });
        assert!(matches!(
            LinearPositionModel::from_json(&bad.to_string()),
            Err(ForecastError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn model_slot_remembers_failure() {
        let mut slot = ModelSlot::default();
        let missing = Path::new("/definitely/not/here/model.json");
        assert!(matches!(
            slot.get_or_load(Some(missing)),
            Err(ForecastError::ModelUnavailable(_))
        ));
        assert!(matches!(slot, ModelSlot::Unavailable(_)));
        assert!(slot.get_or_load(Some(missing)).is_err());
    }
}
