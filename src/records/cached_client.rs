//! Cached records client that wraps [`RecordsClient`] with the
//! query/mutation cache.
//!
//! Reads go through the cache (stale-time + in-flight de-duplication);
//! writes run uncached and invalidate their declared dependent keys, so
//! the next read of each refetches. Auth calls pass straight through.

use crate::cache::{QueryCache, ResourceKey};
use crate::error::ApiError;
use crate::records::client::RecordsClient;
use crate::records::types::{
  Course, CoursePayload, Enrollment, EnrollmentPayload, LoginResponse, Semester, SemesterPayload,
  SignupResponse, Student, StudentPayload,
};

#[derive(Clone)]
pub struct CachedClient {
  inner: RecordsClient,
  cache: QueryCache,
}

impl CachedClient {
  pub fn new(inner: RecordsClient, cache: QueryCache) -> Self {
    Self { inner, cache }
  }

  // -- students --------------------------------------------------------

  pub async fn students(&self) -> Result<Vec<Student>, ApiError> {
    self
      .cache
      .read(ResourceKey::Students, || {
        let inner = self.inner.clone();
        async move { inner.list_students().await }
      })
      .await
  }

  /// Single-entity lookups are small and uncached; the collections are
  /// what every screen hangs off.
  pub async fn student(&self, id: &str) -> Result<Student, ApiError> {
    self.inner.get_student(id).await
  }

  pub async fn create_student(&self, data: &StudentPayload) -> Result<Student, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Students], || {
        let inner = self.inner.clone();
        let data = data.clone();
        async move { inner.create_student(&data).await }
      })
      .await
  }

  pub async fn update_student(&self, id: &str, data: &StudentPayload) -> Result<Student, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Students], || {
        let inner = self.inner.clone();
        let id = id.to_string();
        let data = data.clone();
        async move { inner.update_student(&id, &data).await }
      })
      .await
  }

  pub async fn delete_student(&self, id: &str) -> Result<(), ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Students], || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.delete_student(&id).await }
      })
      .await
  }

  // -- semesters -------------------------------------------------------

  pub async fn semesters(&self) -> Result<Vec<Semester>, ApiError> {
    self
      .cache
      .read(ResourceKey::Semesters, || {
        let inner = self.inner.clone();
        async move { inner.list_semesters().await }
      })
      .await
  }

  pub async fn semester(&self, id: &str) -> Result<Semester, ApiError> {
    self.inner.get_semester(id).await
  }

  pub async fn create_semester(&self, data: &SemesterPayload) -> Result<Semester, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Semesters], || {
        let inner = self.inner.clone();
        let data = data.clone();
        async move { inner.create_semester(&data).await }
      })
      .await
  }

  pub async fn update_semester(
    &self,
    id: &str,
    data: &SemesterPayload,
  ) -> Result<Semester, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Semesters], || {
        let inner = self.inner.clone();
        let id = id.to_string();
        let data = data.clone();
        async move { inner.update_semester(&id, &data).await }
      })
      .await
  }

  /// Students and courses reference the semester, so deleting one leaves
  /// their cached collections pointing at a gone record.
  pub async fn delete_semester(&self, id: &str) -> Result<(), ApiError> {
    self
      .cache
      .mutate(
        &[
          ResourceKey::Semesters,
          ResourceKey::Courses,
          ResourceKey::Students,
        ],
        || {
          let inner = self.inner.clone();
          let id = id.to_string();
          async move { inner.delete_semester(&id).await }
        },
      )
      .await
  }

  // -- courses ---------------------------------------------------------

  pub async fn courses(&self) -> Result<Vec<Course>, ApiError> {
    self
      .cache
      .read(ResourceKey::Courses, || {
        let inner = self.inner.clone();
        async move { inner.list_courses().await }
      })
      .await
  }

  pub async fn course(&self, id: &str) -> Result<Course, ApiError> {
    self.inner.get_course(id).await
  }

  pub async fn create_course(&self, data: &CoursePayload) -> Result<Course, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Courses], || {
        let inner = self.inner.clone();
        let data = data.clone();
        async move { inner.create_course(&data).await }
      })
      .await
  }

  pub async fn update_course(&self, id: &str, data: &CoursePayload) -> Result<Course, ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Courses], || {
        let inner = self.inner.clone();
        let id = id.to_string();
        let data = data.clone();
        async move { inner.update_course(&id, &data).await }
      })
      .await
  }

  pub async fn delete_course(&self, id: &str) -> Result<(), ApiError> {
    self
      .cache
      .mutate(&[ResourceKey::Courses], || {
        let inner = self.inner.clone();
        let id = id.to_string();
        async move { inner.delete_course(&id).await }
      })
      .await
  }

  // -- enrollments -----------------------------------------------------

  pub async fn enrollments(&self) -> Result<Vec<Enrollment>, ApiError> {
    self
      .cache
      .read(ResourceKey::Enrollments, || {
        let inner = self.inner.clone();
        async move { inner.list_enrollments().await }
      })
      .await
  }

  /// Enrolling touches the student and course rows the server reports
  /// (enrollment counts), so those collections are invalidated too.
  pub async fn create_enrollment(&self, data: &EnrollmentPayload) -> Result<Enrollment, ApiError> {
    self
      .cache
      .mutate(
        &[
          ResourceKey::Enrollments,
          ResourceKey::Students,
          ResourceKey::Courses,
        ],
        || {
          let inner = self.inner.clone();
          let data = data.clone();
          async move { inner.create_enrollment(&data).await }
        },
      )
      .await
  }

  // -- auth (uncached pass-through) ------------------------------------

  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
    self.inner.login(email, password).await
  }

  pub async fn signup(&self, email: &str, password: &str) -> Result<SignupResponse, ApiError> {
    self.inner.signup(email, password).await
  }

  pub async fn save_layout(&self, email: &str, layout: &str) -> Result<(), ApiError> {
    self.inner.save_layout(email, layout).await
  }
}
