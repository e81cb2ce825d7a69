use bson::{doc, Bson, Document};
use chrono::Utc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::{sorted_by_enrollment, Store};
use crate::config::Config;
use crate::data::attendance::{AttendanceLog, AttendanceOutcome, AttendanceRecord};
use crate::data::course::Course;
use crate::data::enrollment::{enrollment_id, EnrollOutcome, Enrollment};
use crate::data::session::LiveSession;
use crate::data::user::{normalize_email, LessonProgress, SessionProgress, User};
use crate::error::StoreError;
use crate::role::Role;

pub static USER_COLLECTION_NAME: &str = "users";
pub static COURSE_COLLECTION_NAME: &str = "courses";
pub static ENROLLMENT_COLLECTION_NAME: &str = "enrollments";
pub static SESSION_COLLECTION_NAME: &str = "sessions";
pub static ATTENDANCE_COLLECTION_NAME: &str = "attendance";
pub static BOOTSTRAP_COLLECTION_NAME: &str = "bootstrap";

static FIRST_ADMIN_KEY: &str = "first_admin";

/// Store backed by a MongoDB database.
///
/// Documents are addressed by their `id` field (unique index); the driver's `_id` is unused.
pub struct MongoStore {
    db: Database,
}

fn uuid_bson(id: Uuid) -> Result<Bson, StoreError> {
    Ok(bson::to_bson(&id)?)
}

fn by_id(id: Uuid) -> Result<Document, StoreError> {
    Ok(doc! { "id": uuid_bson(id)? })
}

fn to_doc<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    Ok(bson::to_document(value)?)
}

fn from_doc<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(bson::from_document(document)?)
}

/// Fails on the first document that doesn't decode.
fn decode_all<T: DeserializeOwned>(
    collection: &str,
    documents: Vec<Document>,
) -> Result<Vec<T>, StoreError> {
    documents
        .into_iter()
        .map(|document| {
            from_doc(document).map_err(|e| {
                tracing::error!("Malformed {} document: {}", collection, e);
                e
            })
        })
        .collect()
}

fn now_bson() -> Result<Bson, StoreError> {
    Ok(bson::to_bson(&Utc::now())?)
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match *e.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == 11000,
        _ => false,
    }
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

impl MongoStore {
    pub async fn connect(config: &Config) -> Result<MongoStore, StoreError> {
        tracing::info!("Connecting to MongoDB: {}", config.mongodb_uri);
        let client = Client::with_uri_str(config.mongodb_uri.as_str()).await?;

        tracing::info!("Using MongoDB database: {}", config.mongodb_db);
        let db = client.database(config.mongodb_db.as_str());

        if let Err(e) = db.list_collection_names(None).await {
            tracing::error!("Unable to connect to MongoDB.");
            return Err(StoreError::Unavailable(e.to_string()));
        }

        let store = MongoStore { db };
        store.create_indexes().await?;
        Ok(store)
    }

    async fn create_indexes(&self) -> Result<(), StoreError> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        let plain = |keys: Document| IndexModel::builder().keys(keys).build();

        self.collection(USER_COLLECTION_NAME)
            .create_indexes([unique(doc! {"id": 1}), unique(doc! {"email": 1})], None)
            .await?;
        self.collection(COURSE_COLLECTION_NAME)
            .create_index(unique(doc! {"id": 1}), None)
            .await?;
        self.collection(ENROLLMENT_COLLECTION_NAME)
            .create_indexes(
                [
                    unique(doc! {"id": 1}),
                    plain(doc! {"course_id": 1}),
                    plain(doc! {"user_id": 1}),
                ],
                None,
            )
            .await?;
        self.collection(SESSION_COLLECTION_NAME)
            .create_indexes([unique(doc! {"id": 1}), plain(doc! {"course_id": 1})], None)
            .await?;
        self.collection(ATTENDANCE_COLLECTION_NAME)
            .create_indexes(
                [
                    unique(doc! {"id": 1}),
                    plain(doc! {"course_id": 1}),
                    plain(doc! {"user_id": 1}),
                ],
                None,
            )
            .await?;
        self.collection(BOOTSTRAP_COLLECTION_NAME)
            .create_index(unique(doc! {"key": 1}), None)
            .await?;

        tracing::debug!("MongoDB indexes are in place");
        Ok(())
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    async fn find_one<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<T>, StoreError> {
        match self.collection(collection).find_one(filter, None).await? {
            Some(document) => Ok(Some(from_doc(document)?)),
            None => Ok(None),
        }
    }

    async fn find_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: impl Into<Option<Document>>,
    ) -> Result<Vec<T>, StoreError> {
        let documents: Vec<Document> = self
            .collection(collection)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;

        decode_all(collection, documents)
    }

    /// Writes session progress into the user's course entry. With `only_forward`, counters
    /// never decrease, so marks landing out of order keep the highest figures.
    async fn write_session_progress(
        &self,
        user: Uuid,
        course: Uuid,
        progress: &SessionProgress,
        only_forward: bool,
    ) -> Result<(), StoreError> {
        let prefix = format!("progress.{}", course);
        let mut counters = Document::new();
        counters.insert(
            format!("{}.attended_sessions", prefix),
            bson::to_bson(&progress.attended_sessions)?,
        );
        counters.insert(
            format!("{}.progress_percentage", prefix),
            bson::to_bson(&progress.progress_percentage)?,
        );
        counters.insert(
            format!("{}.last_session_attended", prefix),
            bson::to_bson(&progress.last_session_attended)?,
        );

        let now = now_bson()?;
        let mut set = Document::new();
        set.insert(
            format!("{}.total_sessions", prefix),
            bson::to_bson(&progress.total_sessions)?,
        );
        set.insert(format!("{}.last_updated", prefix), now.clone());
        set.insert("last_updated", now);

        let update = if only_forward {
            doc! { "$set": set, "$max": counters }
        } else {
            for (key, value) in counters {
                set.insert(key, value);
            }
            doc! { "$set": set }
        };
        self.collection(USER_COLLECTION_NAME)
            .update_one(by_id(user)?, update, None)
            .await?;
        Ok(())
    }

    async fn update_user(&self, id: Uuid, set: Document) -> Result<Option<User>, StoreError> {
        let updated = self
            .collection(USER_COLLECTION_NAME)
            .find_one_and_update(by_id(id)?, doc! { "$set": set }, after_update())
            .await?;
        updated.map(from_doc).transpose()
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    fn backend_tag(&self) -> &'static str {
        "mongodb"
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        match self
            .collection(USER_COLLECTION_NAME)
            .insert_one(to_doc(user)?, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.find_one(USER_COLLECTION_NAME, by_id(id)?).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one(USER_COLLECTION_NAME, doc! { "email": normalize_email(email) })
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.find_all(USER_COLLECTION_NAME, None).await?;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        display_name: &str,
    ) -> Result<Option<User>, StoreError> {
        self.update_user(
            id,
            doc! {
                "display_name": display_name,
                "last_updated": now_bson()?,
            },
        )
        .await
    }

    async fn set_user_role(
        &self,
        id: Uuid,
        role: Role,
        changed_by: Uuid,
    ) -> Result<Option<User>, StoreError> {
        let now = now_bson()?;
        self.update_user(
            id,
            doc! {
                "role": bson::to_bson(&role)?,
                "role_changed_by": uuid_bson(changed_by)?,
                "role_changed_at": now.clone(),
                "last_updated": now,
            },
        )
        .await
    }

    async fn delete_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let removed: Option<User> = self
            .collection(USER_COLLECTION_NAME)
            .find_one_and_delete(by_id(id)?, None)
            .await?
            .map(from_doc)
            .transpose()?;

        if removed.is_some() {
            let owned = doc! { "user_id": uuid_bson(id)? };
            self.collection(ENROLLMENT_COLLECTION_NAME)
                .delete_many(owned.clone(), None)
                .await?;
            self.collection(ATTENDANCE_COLLECTION_NAME)
                .delete_many(owned, None)
                .await?;
        }
        Ok(removed)
    }

    async fn claim_first_admin(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let admins = self
            .collection(USER_COLLECTION_NAME)
            .count_documents(doc! { "role": bson::to_bson(&Role::Admin)? }, None)
            .await?;
        if admins > 0 || self.get_user(id).await?.is_none() {
            return Ok(None);
        }

        let claim = doc! {
            "key": FIRST_ADMIN_KEY,
            "user": uuid_bson(id)?,
            "claimed_at": now_bson()?,
        };
        match self
            .collection(BOOTSTRAP_COLLECTION_NAME)
            .insert_one(claim, None)
            .await
        {
            Ok(_) => {}
            Err(e) if is_duplicate_key(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let now = now_bson()?;
        self.update_user(
            id,
            doc! {
                "role": bson::to_bson(&Role::Admin)?,
                "bootstrap_admin": true,
                "role_changed_by": uuid_bson(id)?,
                "role_changed_at": now.clone(),
                "last_updated": now,
            },
        )
        .await
    }

    async fn set_lesson_progress(
        &self,
        user: Uuid,
        course: Uuid,
        lesson: Uuid,
        progress: LessonProgress,
    ) -> Result<Option<User>, StoreError> {
        let now = now_bson()?;
        let mut set = Document::new();
        set.insert(
            format!("progress.{}.lessons.{}", course, lesson),
            bson::to_bson(&progress)?,
        );
        set.insert(format!("progress.{}.last_updated", course), now.clone());
        set.insert("last_updated", now);
        self.update_user(user, set).await
    }

    async fn insert_course(&self, course: &Course) -> Result<(), StoreError> {
        match self
            .collection(COURSE_COLLECTION_NAME)
            .insert_one(to_doc(course)?, None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        self.find_one(COURSE_COLLECTION_NAME, by_id(id)?).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        self.find_all(COURSE_COLLECTION_NAME, None).await
    }

    async fn replace_course(
        &self,
        course: &Course,
        expected_revision: u64,
    ) -> Result<bool, StoreError> {
        let mut filter = by_id(course.id)?;
        filter.insert("revision", bson::to_bson(&expected_revision)?);

        let result = self
            .collection(COURSE_COLLECTION_NAME)
            .replace_one(filter, to_doc(course)?, None)
            .await?;
        if result.matched_count > 0 {
            return Ok(true);
        }

        let exists = self
            .collection(COURSE_COLLECTION_NAME)
            .count_documents(by_id(course.id)?, None)
            .await?
            > 0;
        if exists {
            Err(StoreError::Conflict)
        } else {
            Ok(false)
        }
    }

    async fn delete_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        let removed: Option<Course> = self
            .collection(COURSE_COLLECTION_NAME)
            .find_one_and_delete(by_id(id)?, None)
            .await?
            .map(from_doc)
            .transpose()?;

        if removed.is_some() {
            let owned = doc! { "course_id": uuid_bson(id)? };
            for collection in [
                ENROLLMENT_COLLECTION_NAME,
                SESSION_COLLECTION_NAME,
                ATTENDANCE_COLLECTION_NAME,
            ] {
                self.collection(collection)
                    .delete_many(owned.clone(), None)
                    .await?;
            }
        }
        Ok(removed)
    }

    async fn enroll(&self, enrollment: &Enrollment) -> Result<EnrollOutcome, StoreError> {
        match self
            .collection(ENROLLMENT_COLLECTION_NAME)
            .insert_one(to_doc(enrollment)?, None)
            .await
        {
            Ok(_) => {
                // A delete that ran before this insert has already cascaded.
                let open = self
                    .get_course(enrollment.course_id)
                    .await?
                    .map(|it| it.is_published())
                    .unwrap_or(false);
                if open {
                    return Ok(EnrollOutcome::Created(enrollment.clone()));
                }
                self.collection(ENROLLMENT_COLLECTION_NAME)
                    .delete_one(by_id(enrollment.id)?, None)
                    .await?;
                Ok(EnrollOutcome::CourseUnavailable)
            }
            Err(e) if is_duplicate_key(&e) => {
                let existing: Option<Enrollment> = self
                    .find_one(ENROLLMENT_COLLECTION_NAME, by_id(enrollment.id)?)
                    .await?;
                existing
                    .map(EnrollOutcome::AlreadyEnrolled)
                    .ok_or(StoreError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_enrollment(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        self.find_one(
            ENROLLMENT_COLLECTION_NAME,
            by_id(enrollment_id(course, user))?,
        )
        .await
    }

    async fn list_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        Ok(sorted_by_enrollment(
            self.find_all(ENROLLMENT_COLLECTION_NAME, None).await?,
        ))
    }

    async fn enrollments_for_course(&self, course: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        Ok(sorted_by_enrollment(
            self.find_all(
                ENROLLMENT_COLLECTION_NAME,
                doc! { "course_id": uuid_bson(course)? },
            )
            .await?,
        ))
    }

    async fn enrollments_for_user(&self, user: Uuid) -> Result<Vec<Enrollment>, StoreError> {
        Ok(sorted_by_enrollment(
            self.find_all(
                ENROLLMENT_COLLECTION_NAME,
                doc! { "user_id": uuid_bson(user)? },
            )
            .await?,
        ))
    }

    async fn replace_sessions(
        &self,
        course: Uuid,
        sessions: &[LiveSession],
    ) -> Result<(), StoreError> {
        let owned = doc! { "course_id": uuid_bson(course)? };
        let sessions_collection = self.collection(SESSION_COLLECTION_NAME);
        sessions_collection.delete_many(owned.clone(), None).await?;

        if !sessions.is_empty() {
            let documents = sessions
                .iter()
                .map(to_doc)
                .collect::<Result<Vec<Document>, StoreError>>()?;
            sessions_collection.insert_many(documents, None).await?;
        }

        let kept = sessions
            .iter()
            .map(|it| uuid_bson(it.id))
            .collect::<Result<Vec<Bson>, StoreError>>()?;
        self.collection(ATTENDANCE_COLLECTION_NAME)
            .update_many(
                owned,
                doc! { "$pull": { "records": { "session_id": { "$nin": kept } } } },
                None,
            )
            .await?;

        let now = Utc::now();
        for log in self.attendance_for_course(course).await? {
            let progress = log.session_progress(sessions.len(), now);
            self.write_session_progress(log.user_id, course, &progress, false)
                .await?;
        }
        Ok(())
    }

    async fn sessions_for_course(&self, course: Uuid) -> Result<Vec<LiveSession>, StoreError> {
        let mut sessions: Vec<LiveSession> = self
            .find_all(
                SESSION_COLLECTION_NAME,
                doc! { "course_id": uuid_bson(course)? },
            )
            .await?;
        sessions.sort_by_key(|it| it.scheduled_at);
        Ok(sessions)
    }

    async fn record_attendance(
        &self,
        course: Uuid,
        user: Uuid,
        record: &AttendanceRecord,
    ) -> Result<AttendanceOutcome, StoreError> {
        let sessions = self.sessions_for_course(course).await?;
        if !sessions.iter().any(|it| it.id == record.session_id) {
            return Ok(AttendanceOutcome::UnknownSession);
        }
        let log_id = enrollment_id(course, user);

        // Matches only a log without this session; otherwise the upsert collides on `id`.
        let filter = doc! {
            "id": uuid_bson(log_id)?,
            "records.session_id": { "$ne": uuid_bson(record.session_id)? },
        };
        let update = doc! {
            "$push": { "records": bson::to_bson(record)? },
            "$setOnInsert": {
                "course_id": uuid_bson(course)?,
                "user_id": uuid_bson(user)?,
            },
        };

        let result = self
            .collection(ATTENDANCE_COLLECTION_NAME)
            .update_one(
                filter,
                update,
                UpdateOptions::builder().upsert(true).build(),
            )
            .await;

        let recorded = match result {
            Ok(_) => true,
            Err(e) if is_duplicate_key(&e) => false,
            Err(e) => return Err(e.into()),
        };

        let log: AttendanceLog = self
            .find_one(ATTENDANCE_COLLECTION_NAME, by_id(log_id)?)
            .await?
            .ok_or(StoreError::Conflict)?;

        if recorded {
            let progress = log.session_progress(sessions.len(), record.timestamp);
            self.write_session_progress(user, course, &progress, true)
                .await?;
            return Ok(AttendanceOutcome::Recorded(log));
        }
        log.record_for(record.session_id)
            .cloned()
            .map(AttendanceOutcome::AlreadyRecorded)
            .ok_or(StoreError::Conflict)
    }

    async fn attendance_log(
        &self,
        course: Uuid,
        user: Uuid,
    ) -> Result<Option<AttendanceLog>, StoreError> {
        self.find_one(
            ATTENDANCE_COLLECTION_NAME,
            by_id(enrollment_id(course, user))?,
        )
        .await
    }

    async fn attendance_for_course(&self, course: Uuid) -> Result<Vec<AttendanceLog>, StoreError> {
        self.find_all(
            ATTENDANCE_COLLECTION_NAME,
            doc! { "course_id": uuid_bson(course)? },
        )
        .await
    }

    async fn attendance_for_user(&self, user: Uuid) -> Result<Vec<AttendanceLog>, StoreError> {
        self.find_all(
            ATTENDANCE_COLLECTION_NAME,
            doc! { "user_id": uuid_bson(user)? },
        )
        .await
    }
}
