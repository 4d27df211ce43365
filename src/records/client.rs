use crate::error::ApiError;
use crate::records::http::HttpClient;
use crate::records::types::{
  Course, CoursePayload, Credentials, Enrollment, EnrollmentPayload, LoginResponse,
  SaveLayoutRequest, Semester, SemesterPayload, SignupResponse, Student, StudentPayload,
};

/// Raw records API client: a pure mapping from intent to endpoint, with no
/// caching and no business logic.
#[derive(Clone)]
pub struct RecordsClient {
  http: HttpClient,
}

impl RecordsClient {
  pub fn new(http: HttpClient) -> Self {
    Self { http }
  }

  // -- students --------------------------------------------------------

  pub async fn list_students(&self) -> Result<Vec<Student>, ApiError> {
    self.http.get("/students").await
  }

  pub async fn get_student(&self, id: &str) -> Result<Student, ApiError> {
    self.http.get(&format!("/students/{}", id)).await
  }

  pub async fn create_student(&self, data: &StudentPayload) -> Result<Student, ApiError> {
    self.http.post("/students", data).await
  }

  pub async fn update_student(&self, id: &str, data: &StudentPayload) -> Result<Student, ApiError> {
    self.http.put(&format!("/students/{}", id), data).await
  }

  pub async fn delete_student(&self, id: &str) -> Result<(), ApiError> {
    self.http.delete(&format!("/students/{}", id)).await
  }

  // -- semesters -------------------------------------------------------

  pub async fn list_semesters(&self) -> Result<Vec<Semester>, ApiError> {
    self.http.get("/semesters").await
  }

  pub async fn get_semester(&self, id: &str) -> Result<Semester, ApiError> {
    self.http.get(&format!("/semesters/{}", id)).await
  }

  pub async fn create_semester(&self, data: &SemesterPayload) -> Result<Semester, ApiError> {
    self.http.post("/semesters", data).await
  }

  pub async fn update_semester(
    &self,
    id: &str,
    data: &SemesterPayload,
  ) -> Result<Semester, ApiError> {
    self.http.put(&format!("/semesters/{}", id), data).await
  }

  pub async fn delete_semester(&self, id: &str) -> Result<(), ApiError> {
    self.http.delete(&format!("/semesters/{}", id)).await
  }

  // -- courses ---------------------------------------------------------

  pub async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
    self.http.get("/courses").await
  }

  pub async fn get_course(&self, id: &str) -> Result<Course, ApiError> {
    self.http.get(&format!("/courses/{}", id)).await
  }

  pub async fn create_course(&self, data: &CoursePayload) -> Result<Course, ApiError> {
    self.http.post("/courses", data).await
  }

  pub async fn update_course(&self, id: &str, data: &CoursePayload) -> Result<Course, ApiError> {
    self.http.put(&format!("/courses/{}", id), data).await
  }

  pub async fn delete_course(&self, id: &str) -> Result<(), ApiError> {
    self.http.delete(&format!("/courses/{}", id)).await
  }

  // -- enrollments (create-only resource) ------------------------------

  pub async fn list_enrollments(&self) -> Result<Vec<Enrollment>, ApiError> {
    self.http.get("/enrollments").await
  }

  pub async fn create_enrollment(&self, data: &EnrollmentPayload) -> Result<Enrollment, ApiError> {
    self.http.post("/enrollments", data).await
  }

  // -- auth ------------------------------------------------------------

  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
    let body = Credentials {
      email: email.to_string(),
      password: password.to_string(),
    };
    self.http.post("/auth/login", &body).await
  }

  pub async fn signup(&self, email: &str, password: &str) -> Result<SignupResponse, ApiError> {
    let body = Credentials {
      email: email.to_string(),
      password: password.to_string(),
    };
    self.http.post("/auth/signup", &body).await
  }

  /// Persist a serialized dashboard layout for `email`. The response body
  /// is irrelevant; only the status matters.
  pub async fn save_layout(&self, email: &str, layout: &str) -> Result<(), ApiError> {
    let body = SaveLayoutRequest {
      email: email.to_string(),
      layout: layout.to_string(),
    };
    let _: serde_json::Value = self.http.post("/auth/layout", &body).await?;
    Ok(())
  }
}
