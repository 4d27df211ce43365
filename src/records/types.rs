//! Wire types for the student-records API.
//!
//! Field names follow the server's camelCase JSON. Identifiers are opaque
//! strings; the client never interprets them.

use serde::{Deserialize, Serialize};

/// One phone-number row attached to a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
  pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub id: String,
  pub name: String,
  pub semester_id: String,
  #[serde(default)]
  pub phone_numbers: Vec<PhoneNumber>,
}

/// Payload for creating or updating a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPayload {
  pub name: String,
  pub semester_id: String,
  #[serde(default)]
  pub phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semester {
  pub id: String,
  /// Display name, e.g. "Fall 2025".
  pub semester: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterPayload {
  pub semester: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
  pub id: String,
  pub name: String,
  pub instructor: String,
  pub credit_hours: u32,
  pub semester_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePayload {
  pub name: String,
  pub instructor: String,
  pub credit_hours: u32,
  pub semester_id: String,
}

/// An enrollment row. The server joins in the display names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
  pub id: String,
  pub student_id: String,
  pub course_id: String,
  #[serde(default)]
  pub student_name: Option<String>,
  #[serde(default)]
  pub course_name: Option<String>,
  #[serde(default)]
  pub semester_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPayload {
  pub student_id: String,
  pub course_id: String,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

/// Response to a successful credential exchange. `token` may be absent and
/// `layout` is the serialized dashboard layout, `null` for a fresh account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoginResponse {
  pub email: String,
  #[serde(default)]
  pub token: Option<String>,
  #[serde(default)]
  pub layout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignupResponse {
  pub message: String,
}

/// Body for `POST /auth/layout`: the layout travels pre-serialized.
#[derive(Debug, Clone, Serialize)]
pub struct SaveLayoutRequest {
  pub email: String,
  pub layout: String,
}
