pub mod answer;
pub mod health;
