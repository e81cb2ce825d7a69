use rocket::response::stream::{Event, EventStream};
use rocket::tokio::select;
use rocket::{Shutdown, State};
use uuid::Uuid;

use crate::feed::{ChangeEvent, ChangeFeed, Subscription};
use crate::resp::jwt::CurrentUser;
use crate::resp::problem::Problem;
use crate::store::StoreHandle;

/// Reloads the subscriber's role when their own profile changed. Returns `false` once the
/// subscriber no longer exists.
async fn follow_profile(
    subscription: &mut Subscription,
    user: Uuid,
    event: &ChangeEvent,
    store: &StoreHandle,
) -> bool {
    match event {
        ChangeEvent::ProfileUpdated { user_id } if *user_id == user => {
            match store.get_user(user).await {
                Ok(Some(it)) => {
                    subscription.set_role(it.role);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!("ending feed of {}: {}", user, e);
                    false
                }
            }
        }
        _ => true,
    }
}

/// Server-sent change events visible to the signed in user
///
/// Each message is named after the event type and carries the event as JSON. The stream ends
/// when the server shuts down or the user is deleted.
#[utoipa::path(
    responses(
        (status = 200, description = "Stream of change events", body = ChangeEvent, content_type = "text/event-stream"),
        (status = 401, description = "Missing/expired token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/feed")]
pub fn feed_stream(
    user: CurrentUser,
    feed: &State<ChangeFeed>,
    store: &State<StoreHandle>,
    mut end: Shutdown,
) -> EventStream![] {
    let span = tracing::debug_span!("feed_stream", user = %user.id);
    let _entered = span.enter();

    let mut subscription = feed.subscribe(user.id, user.role);
    tracing::debug!("{} subscribed, {} listening", user.id, feed.subscriber_count());
    let store = store.inner().clone();
    let user = user.id;

    EventStream! {
        loop {
            let event = select! {
                next = subscription.next() => match next {
                    Some(event) => event,
                    None => break,
                },
                _ = &mut end => break,
            };
            let alive = follow_profile(&mut subscription, user, &event, &store).await;
            yield Event::json(&event).event(event.name());
            if !alive {
                break;
            }
        }
    }
}

#[cfg(test)]
mod feed_endpoints {
    use std::time::Duration;

    use rocket::http::{ContentType, Status};
    use rocket::tokio::time::timeout;

    use super::follow_profile;
    use crate::data::session::SessionSchedule;
    use crate::feed::{ChangeEvent, ChangeFeed, Subscription};
    use crate::role::Role;
    use crate::route::testing::*;

    async fn next_event(subscription: &mut Subscription) -> Option<ChangeEvent> {
        timeout(Duration::from_millis(200), subscription.next())
            .await
            .ok()
            .flatten()
    }

    #[rocket::async_test]
    async fn writes_publish_events_to_the_users_involved() {
        let client = client().await;
        let teacher = signup_as(&client, "feed_events_teacher", Role::Instructor).await;
        let student = signup(&client, "feed_events_student").await;
        let outsider = signup(&client, "feed_events_outsider").await;
        let admin = signup_admin(&client, "feed_events_admin").await;
        let course = create_course(&client, &teacher.token, "Rust", 0.0, &[1], "published").await;
        let id = course.course.id;

        let response = client
            .post(format!("/api/v1/course/{}/sessions", id))
            .header(bearer(&teacher.token))
            .header(ContentType::JSON)
            .body(r#"{"starts_on":"2020-01-06T00:00:00Z"}"#)
            .dispatch()
            .await;
        let schedule: SessionSchedule = response.into_json().await.expect("invalid json");
        let session = schedule.past[0].session.id;

        let feed = client.rocket().state::<ChangeFeed>().expect("feed is managed");
        let mut as_student = feed.subscribe(student.id, Role::Student);
        let mut as_teacher = feed.subscribe(teacher.id, Role::Instructor);
        let mut as_outsider = feed.subscribe(outsider.id, Role::Student);
        let mut as_admin = feed.subscribe(admin.id, Role::Admin);

        let response = client
            .post(format!("/api/v1/course/{}/enroll", id))
            .header(bearer(&student.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let enrolled = ChangeEvent::Enrolled {
            course_id: id,
            user_id: student.id,
            instructor_id: teacher.id,
        };
        assert_eq!(next_event(&mut as_student).await, Some(enrolled.clone()));
        assert_eq!(next_event(&mut as_teacher).await, Some(enrolled.clone()));
        assert_eq!(next_event(&mut as_admin).await, Some(enrolled));

        let response = client
            .post(format!("/api/v1/course/{}/attendance", id))
            .header(bearer(&student.token))
            .header(ContentType::JSON)
            .body(format!(r#"{{"session_id":"{}"}}"#, session))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let marked = ChangeEvent::AttendanceMarked {
            course_id: id,
            user_id: student.id,
            instructor_id: teacher.id,
            session_id: session,
            attended: true,
        };
        assert_eq!(next_event(&mut as_student).await, Some(marked.clone()));
        assert_eq!(next_event(&mut as_teacher).await, Some(marked.clone()));
        assert_eq!(next_event(&mut as_admin).await, Some(marked));

        let response = client
            .put(format!("/api/v1/user/{}/role", student.id))
            .header(bearer(&admin.token))
            .header(ContentType::JSON)
            .body(r#"{"role":"instructor"}"#)
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let promoted = ChangeEvent::ProfileUpdated {
            user_id: student.id,
        };
        assert_eq!(next_event(&mut as_student).await, Some(promoted.clone()));
        assert_eq!(next_event(&mut as_admin).await, Some(promoted));

        let response = client
            .delete(format!("/api/v1/course/{}", id))
            .header(bearer(&teacher.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let deleted = ChangeEvent::CourseDeleted { course_id: id };
        for subscription in [&mut as_student, &mut as_teacher, &mut as_admin] {
            assert_eq!(next_event(subscription).await, Some(deleted.clone()));
        }
        // Nothing before the delete concerned the outsider.
        assert_eq!(next_event(&mut as_outsider).await, Some(deleted));
        assert_eq!(next_event(&mut as_outsider).await, None);
    }

    #[rocket::async_test]
    async fn feed_requires_sign_in() {
        let client = client().await;
        let response = client.get("/api/v1/feed").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn role_changes_reach_open_subscriptions() {
        let client = client().await;
        let admin = signup_admin(&client, "feed_demoted_admin").await;
        let feed = client.rocket().state::<ChangeFeed>().expect("feed is managed");
        let mut subscription = feed.subscribe(admin.id, Role::Admin);

        promote(&client, admin.id, Role::Student).await;
        let changed = ChangeEvent::ProfileUpdated { user_id: admin.id };
        assert!(follow_profile(&mut subscription, admin.id, &changed, store(&client)).await);

        feed.publish(ChangeEvent::Enrolled {
            course_id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            instructor_id: uuid::Uuid::new_v4(),
        });
        feed.publish(changed.clone());
        assert_eq!(subscription.next().await, Some(changed.clone()));

        store(&client).delete_user(admin.id).await.expect("delete");
        assert!(!follow_profile(&mut subscription, admin.id, &changed, store(&client)).await);
    }
}
