use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_RATING: f64 = 5.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    Driver,
    Both,
}

impl Role {
    pub fn can_drive(self) -> bool {
        matches!(self, Role::Driver | Role::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub rating: f64,
    pub rating_count: u32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Folds one more score into the running average, kept to one decimal.
    pub fn record_rating(&mut self, score: u8) {
        let total = self.rating * f64::from(self.rating_count) + f64::from(score);
        self.rating_count = self.rating_count.saturating_add(1);
        self.rating = (total / f64::from(self.rating_count) * 10.0).round() / 10.0;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Role, User, DEFAULT_RATING};

    fn driver() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Rahim".to_string(),
            email: "rahim@campus.edu".to_string(),
            role: Role::Driver,
            rating: DEFAULT_RATING,
            rating_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn first_rating_replaces_default() {
        let mut user = driver();
        user.record_rating(3);
        assert_eq!(user.rating, 3.0);
        assert_eq!(user.rating_count, 1);
    }

    #[test]
    fn running_average_rounds_to_one_decimal() {
        let mut user = driver();
        user.record_rating(5);
        user.record_rating(4);
        user.record_rating(4);
        // 13 / 3 = 4.333..
        assert_eq!(user.rating, 4.3);
        assert_eq!(user.rating_count, 3);
    }

    #[test]
    fn only_driver_roles_can_drive() {
        assert!(Role::Driver.can_drive());
        assert!(Role::Both.can_drive());
        assert!(!Role::Passenger.can_drive());
    }
}
