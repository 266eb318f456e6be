use serde::Deserialize;

use crate::tours::repo::{NewTour, TourChanges};

#[derive(Debug, Deserialize)]
pub struct CreateTourRequest {
    pub name: String,
    pub duration_days: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl From<CreateTourRequest> for NewTour {
    fn from(req: CreateTourRequest) -> Self {
        Self {
            name: req.name,
            duration_days: req.duration_days,
            max_group_size: req.max_group_size,
            difficulty: req.difficulty,
            price: req.price,
            summary: req.summary,
            description: req.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTourRequest {
    pub name: Option<String>,
    pub duration_days: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub price: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl From<UpdateTourRequest> for TourChanges {
    fn from(req: UpdateTourRequest) -> Self {
        Self {
            name: req.name,
            duration_days: req.duration_days,
            max_group_size: req.max_group_size,
            difficulty: req.difficulty,
            price: req.price,
            summary: req.summary,
            description: req.description,
        }
    }
}
