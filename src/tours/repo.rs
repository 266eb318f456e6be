use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{self, QuerySpec};

const TOUR_COLUMNS: &str = "id, name, duration_days, max_group_size, difficulty, \
     price, ratings_average, ratings_quantity, summary, description, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub duration_days: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTour {
    pub name: String,
    pub duration_days: i32,
    pub max_group_size: i32,
    pub difficulty: String,
    pub price: f64,
    pub summary: Option<String>,
    pub description: Option<String>,
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct TourChanges {
    pub name: Option<String>,
    pub duration_days: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<String>,
    pub price: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl TourChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.duration_days.is_none()
            && self.max_group_size.is_none()
            && self.difficulty.is_none()
            && self.price.is_none()
            && self.summary.is_none()
            && self.description.is_none()
    }
}

/// Per-difficulty aggregation over the whole collection.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TourStats {
    pub difficulty: String,
    pub num_tours: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_rating: Option<f64>,
}

impl Tour {
    pub async fn list(db: &PgPool, spec: &QuerySpec) -> anyhow::Result<Vec<Tour>> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {TOUR_COLUMNS} FROM tours"));
        query::sql::apply(&mut qb, spec);
        let tours = qb.build_query_as::<Tour>().fetch_all(db).await?;
        Ok(tours)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Tour>> {
        let sql = format!("SELECT {TOUR_COLUMNS} FROM tours WHERE id = $1");
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(tour)
    }

    pub async fn create(db: &PgPool, new: NewTour) -> anyhow::Result<Tour> {
        let sql = format!(
            "INSERT INTO tours (name, duration_days, max_group_size, difficulty, \
             price, summary, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TOUR_COLUMNS}"
        );
        let tour = sqlx::query_as::<_, Tour>(&sql)
            .bind(new.name)
            .bind(new.duration_days)
            .bind(new.max_group_size)
            .bind(new.difficulty)
            .bind(new.price)
            .bind(new.summary)
            .bind(new.description)
            .fetch_one(db)
            .await?;
        Ok(tour)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        changes: TourChanges,
    ) -> anyhow::Result<Option<Tour>> {
        if changes.is_empty() {
            return Self::find_by_id(db, id).await;
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE tours SET ");
        let mut set = qb.separated(", ");
        if let Some(name) = changes.name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(duration_days) = changes.duration_days {
            set.push("duration_days = ").push_bind_unseparated(duration_days);
        }
        if let Some(max_group_size) = changes.max_group_size {
            set.push("max_group_size = ").push_bind_unseparated(max_group_size);
        }
        if let Some(difficulty) = changes.difficulty {
            set.push("difficulty = ").push_bind_unseparated(difficulty);
        }
        if let Some(price) = changes.price {
            set.push("price = ").push_bind_unseparated(price);
        }
        if let Some(summary) = changes.summary {
            set.push("summary = ").push_bind_unseparated(summary);
        }
        if let Some(description) = changes.description {
            set.push("description = ").push_bind_unseparated(description);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {TOUR_COLUMNS}"));

        let tour = qb.build_query_as::<Tour>().fetch_optional(db).await?;
        Ok(tour)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM tours WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(db: &PgPool) -> anyhow::Result<Vec<TourStats>> {
        let stats = sqlx::query_as::<_, TourStats>(
            "SELECT difficulty, \
                    COUNT(*) AS num_tours, \
                    AVG(price) AS avg_price, \
                    MIN(price) AS min_price, \
                    MAX(price) AS max_price, \
                    AVG(ratings_average) AS avg_rating \
             FROM tours \
             GROUP BY difficulty \
             ORDER BY avg_price ASC",
        )
        .fetch_all(db)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_changes_detects_all_none() {
        assert!(TourChanges::default().is_empty());
        assert!(!TourChanges {
            price: Some(499.0),
            ..TourChanges::default()
        }
        .is_empty());
    }

    #[test]
    fn tour_serializes_all_public_fields() {
        let tour = Tour {
            id: Uuid::new_v4(),
            name: "The Forest Hiker".into(),
            duration_days: 5,
            max_group_size: 25,
            difficulty: "easy".into(),
            price: 397.0,
            ratings_average: 4.7,
            ratings_quantity: 37,
            summary: Some("Breathtaking hike".into()),
            description: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let value = serde_json::to_value(&tour).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("price"));
        assert!(obj.contains_key("ratings_average"));
    }
}
