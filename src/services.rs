use crate::config::DbPool;
use crate::errors::ApiError;
use crate::middleware::UserSession;
use crate::models::*;
use actix_web::web;
use chrono::{DateTime, Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha512;
use std::collections::HashMap;
use uuid::Uuid;

const SALT_LENGTH: usize = 16;
const PASSWORD_LENGTH: usize = 64;
const KDF_ITERATIONS: u32 = 100_000;
const TOKEN_TTL_HOURS: i64 = 24;

/// Path ids that are not valid UUIDs cannot match any record, so they are
/// reported the same way as a miss.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFoundError(format!("{} not found", what)))
}

type PooledPg =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

fn get_conn(pool: &DbPool) -> Result<PooledPg, ApiError> {
    pool.get().map_err(|e| {
        error!("Failed to get database connection: {}", e);
        ApiError::DatabaseError(e.to_string())
    })
}

pub struct AuthService;

impl AuthService {
    pub fn generate_salt() -> String {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        hex::encode(salt)
    }

    /// PBKDF2-HMAC-SHA512, 100k iterations, 64-byte output, hex-encoded.
    /// The hex salt string itself is the KDF salt input.
    pub fn hash_password(password: &str, salt: &str) -> String {
        let mut out = [0u8; PASSWORD_LENGTH];
        pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), KDF_ITERATIONS, &mut out);
        hex::encode(out)
    }

    pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
        Self::hash_password(password, salt) == stored_hash
    }

    pub fn generate_token(user_id: Uuid, role: Role, secret: &str) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp() as usize,
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| {
            error!("Failed to generate token: {}", e);
            ApiError::InternalError("Failed to generate token".to_string())
        })
    }

    pub fn verify_token(token: &str, secret: &str) -> Result<UserSession, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| ApiError::AuthError(format!("Invalid session token: {}", e)))?;

        let id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ApiError::AuthError("Invalid session token".to_string()))?;

        Ok(UserSession {
            id,
            role: data.claims.role,
        })
    }
}

pub struct UserService;

impl UserService {
    pub async fn find_by_email(email_addr: &str, pool: &DbPool) -> Result<Option<User>, ApiError> {
        let email_copy = email_addr.to_string();
        let conn = get_conn(pool)?;

        let user = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            users
                .filter(email.eq(email_copy))
                .first::<User>(&mut conn)
                .optional()
        })
        .await??;

        Ok(user)
    }

    pub async fn get_by_id(user_id: Uuid, pool: &DbPool) -> Result<Option<User>, ApiError> {
        let conn = get_conn(pool)?;

        let user = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            users.find(user_id).first::<User>(&mut conn).optional()
        })
        .await??;

        Ok(user)
    }

    pub async fn list_all(pool: &DbPool) -> Result<Vec<User>, ApiError> {
        let conn = get_conn(pool)?;

        let all = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            users.load::<User>(&mut conn)
        })
        .await??;

        debug!("Listed {} users", all.len());
        Ok(all)
    }

    pub async fn create(new_user: NewUser, pool: &DbPool) -> Result<Uuid, ApiError> {
        let conn = get_conn(pool)?;
        let user_id = new_user.id;
        let user_email = new_user.email.clone();

        web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::insert_into(users).values(&new_user).execute(&mut conn)
        })
        .await??;

        info!("Created new user {} ({})", user_email, user_id);
        Ok(user_id)
    }

    pub async fn update_profile(
        user_id: Uuid,
        changes: ProfileChangeset,
        pool: &DbPool,
    ) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let updated = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::update(users.find(user_id))
                .set(&changes)
                .execute(&mut conn)
        })
        .await??;

        Ok(updated)
    }

    pub async fn admin_update(
        user_id: Uuid,
        changes: UserChangeset,
        pool: &DbPool,
    ) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let updated = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::update(users.find(user_id))
                .set(&changes)
                .execute(&mut conn)
        })
        .await??;

        Ok(updated)
    }

    pub async fn delete(user_id: Uuid, pool: &DbPool) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let deleted = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::delete(users.find(user_id)).execute(&mut conn)
        })
        .await??;

        Ok(deleted)
    }
}

pub struct IssueService;

impl IssueService {
    pub async fn create(new_issue: NewIssue, pool: &DbPool) -> Result<Uuid, ApiError> {
        let conn = get_conn(pool)?;
        let issue_id = new_issue.id;

        web::block(move || {
            use crate::schema::issues::dsl::*;
            let mut conn = conn;
            diesel::insert_into(issues)
                .values(&new_issue)
                .execute(&mut conn)
        })
        .await??;

        info!("Created new issue {}", issue_id);
        Ok(issue_id)
    }

    pub async fn list_all(pool: &DbPool) -> Result<Vec<Issue>, ApiError> {
        let conn = get_conn(pool)?;

        let all = web::block(move || {
            use crate::schema::issues::dsl::*;
            let mut conn = conn;
            issues.order(created_at.desc()).load::<Issue>(&mut conn)
        })
        .await??;

        debug!("Listed {} issues", all.len());
        Ok(all)
    }

    pub async fn get_by_id(issue_id: Uuid, pool: &DbPool) -> Result<Option<Issue>, ApiError> {
        let conn = get_conn(pool)?;

        let issue = web::block(move || {
            use crate::schema::issues::dsl::*;
            let mut conn = conn;
            issues.find(issue_id).first::<Issue>(&mut conn).optional()
        })
        .await??;

        Ok(issue)
    }

    pub async fn update(
        issue_id: Uuid,
        changes: IssueChangeset,
        pool: &DbPool,
    ) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let updated = web::block(move || {
            use crate::schema::issues::dsl::*;
            let mut conn = conn;
            diesel::update(issues.find(issue_id))
                .set(&changes)
                .execute(&mut conn)
        })
        .await??;

        Ok(updated)
    }

    pub async fn delete(issue_id: Uuid, pool: &DbPool) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let deleted = web::block(move || {
            use crate::schema::issues::dsl::*;
            let mut conn = conn;
            diesel::delete(issues.find(issue_id)).execute(&mut conn)
        })
        .await??;

        Ok(deleted)
    }

    pub async fn analytics(pool: &DbPool) -> Result<AnalyticsData, ApiError> {
        let conn = get_conn(pool)?;

        let data = web::block(move || -> Result<AnalyticsData, diesel::result::Error> {
            use crate::schema::{issues, offices, users};
            let mut conn = conn;

            let total_users = users::table.count().get_result::<i64>(&mut conn)?;
            let total_issues = issues::table.count().get_result::<i64>(&mut conn)?;
            let total_offices = offices::table.count().get_result::<i64>(&mut conn)?;

            let count_by_status = |conn: &mut PgConnection, value: &str| {
                issues::table
                    .filter(issues::status.eq(value))
                    .count()
                    .get_result::<i64>(conn)
            };
            let open_issues = count_by_status(&mut conn, IssueStatus::Open.as_str())?;
            let in_progress_issues = count_by_status(&mut conn, IssueStatus::InProgress.as_str())?;
            let resolved_issues = count_by_status(&mut conn, IssueStatus::Resolved.as_str())?;

            let count_by_priority = |conn: &mut PgConnection, value: &str| {
                issues::table
                    .filter(issues::priority.eq(value))
                    .count()
                    .get_result::<i64>(conn)
            };
            let high_priority = count_by_priority(&mut conn, IssuePriority::High.as_str())?;
            let medium_priority = count_by_priority(&mut conn, IssuePriority::Medium.as_str())?;
            let low_priority = count_by_priority(&mut conn, IssuePriority::Low.as_str())?;

            let resolution_spans = issues::table
                .filter(issues::status.eq(IssueStatus::Resolved.as_str()))
                .select((issues::created_at, issues::updated_at))
                .load::<(DateTime<Utc>, DateTime<Utc>)>(&mut conn)?;
            let avg_resolution_time_ms = average_resolution_ms(&resolution_spans);

            let issues_by_office = issues::table
                .inner_join(users::table)
                .group_by(users::office)
                .select((users::office, count_star()))
                .load::<(String, i64)>(&mut conn)?;

            let recent_issues = issues::table
                .order(issues::created_at.desc())
                .limit(10)
                .load::<Issue>(&mut conn)?;

            Ok(AnalyticsData {
                total_users,
                total_issues,
                total_offices,
                open_issues,
                in_progress_issues,
                resolved_issues,
                high_priority,
                medium_priority,
                low_priority,
                avg_resolution_time_ms,
                issues_by_office,
                recent_issues,
            })
        })
        .await??;

        Ok(data)
    }
}

pub struct AnalyticsData {
    pub total_users: i64,
    pub total_issues: i64,
    pub total_offices: i64,
    pub open_issues: i64,
    pub in_progress_issues: i64,
    pub resolved_issues: i64,
    pub high_priority: i64,
    pub medium_priority: i64,
    pub low_priority: i64,
    pub avg_resolution_time_ms: f64,
    pub issues_by_office: Vec<(String, i64)>,
    pub recent_issues: Vec<Issue>,
}

/// Mean of (updated_at - created_at) in milliseconds over resolved issues.
pub fn average_resolution_ms(spans: &[(DateTime<Utc>, DateTime<Utc>)]) -> f64 {
    if spans.is_empty() {
        return 0.0;
    }
    let total: i64 = spans
        .iter()
        .map(|(created, updated)| (*updated - *created).num_milliseconds())
        .sum();
    total as f64 / spans.len() as f64
}

pub struct OfficeService;

impl OfficeService {
    pub async fn list_all(pool: &DbPool) -> Result<Vec<Office>, ApiError> {
        let conn = get_conn(pool)?;

        let all = web::block(move || {
            use crate::schema::offices::dsl::*;
            let mut conn = conn;
            offices.load::<Office>(&mut conn)
        })
        .await??;

        Ok(all)
    }

    pub async fn find_by_name(office_name: &str, pool: &DbPool) -> Result<Option<Office>, ApiError> {
        let name_copy = office_name.to_string();
        let conn = get_conn(pool)?;

        let office = web::block(move || {
            use crate::schema::offices::dsl::*;
            let mut conn = conn;
            offices
                .filter(name.eq(name_copy))
                .first::<Office>(&mut conn)
                .optional()
        })
        .await??;

        Ok(office)
    }

    pub async fn create(new_office: NewOffice, pool: &DbPool) -> Result<Uuid, ApiError> {
        let conn = get_conn(pool)?;
        let office_id = new_office.id;
        let office_name = new_office.name.clone();

        web::block(move || {
            use crate::schema::offices::dsl::*;
            let mut conn = conn;
            diesel::insert_into(offices)
                .values(&new_office)
                .execute(&mut conn)
        })
        .await??;

        info!("Created office {} ({})", office_name, office_id);
        Ok(office_id)
    }

    pub async fn update(
        office_id: Uuid,
        changes: OfficeChangeset,
        pool: &DbPool,
    ) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let updated = web::block(move || {
            use crate::schema::offices::dsl::*;
            let mut conn = conn;
            diesel::update(offices.find(office_id))
                .set(&changes)
                .execute(&mut conn)
        })
        .await??;

        Ok(updated)
    }

    pub async fn delete(office_id: Uuid, pool: &DbPool) -> Result<usize, ApiError> {
        let conn = get_conn(pool)?;

        let deleted = web::block(move || {
            use crate::schema::offices::dsl::*;
            let mut conn = conn;
            diesel::delete(offices.find(office_id)).execute(&mut conn)
        })
        .await??;

        Ok(deleted)
    }
}

/// The side of a conversation being addressed. Standard users always own the
/// conversation keyed by their own id; everyone else must name one.
#[derive(Debug, Clone, Copy)]
pub enum ConversationTarget {
    Own,
    Explicit(Uuid),
}

impl ConversationTarget {
    pub fn resolve(&self, session: &UserSession) -> Result<Uuid, ApiError> {
        match self {
            ConversationTarget::Own => match session.role {
                Role::Standard => Ok(session.id),
                _ => Err(ApiError::ValidationError(
                    "Conversation ID required".to_string(),
                )),
            },
            ConversationTarget::Explicit(id) => Ok(*id),
        }
    }

    /// Conversation a message from this sender lands in: forced to the
    /// sender's own conversation for standard users regardless of what the
    /// client supplied.
    pub fn for_sender(session: &UserSession, supplied: Option<Uuid>) -> Result<Uuid, ApiError> {
        match session.role {
            Role::Standard => Ok(session.id),
            _ => supplied.ok_or_else(|| {
                ApiError::ValidationError("Conversation ID required".to_string())
            }),
        }
    }
}

#[derive(Debug)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub last_message: String,
    pub last_message_time: DateTime<Utc>,
    pub unread_count: i64,
}

/// Fold messages (ascending by time) into per-conversation summaries, newest
/// conversation first. Unread counts only the standard-user side, which is
/// what the service desk inbox shows.
pub fn summarize_conversations(messages: &[ChatMessage]) -> Vec<ConversationSummary> {
    let mut map: HashMap<Uuid, ConversationSummary> = HashMap::new();
    for msg in messages {
        let entry = map
            .entry(msg.conversation_id)
            .or_insert_with(|| ConversationSummary {
                conversation_id: msg.conversation_id,
                last_message: String::new(),
                last_message_time: msg.created_at,
                unread_count: 0,
            });
        entry.last_message = msg.message.clone();
        entry.last_message_time = msg.created_at;
        if !msg.read && msg.sender_role == Role::Standard.as_str() {
            entry.unread_count += 1;
        }
    }

    let mut out: Vec<ConversationSummary> = map.into_values().collect();
    out.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    out
}

pub struct ChatService;

impl ChatService {
    pub async fn conversations(pool: &DbPool) -> Result<Vec<ConversationApi>, ApiError> {
        let conn = get_conn(pool)?;

        let convs = web::block(move || -> Result<Vec<ConversationApi>, diesel::result::Error> {
            use crate::schema::{chat_messages, users};
            let mut conn = conn;

            let messages = chat_messages::table
                .order(chat_messages::created_at.asc())
                .load::<ChatMessage>(&mut conn)?;
            let summaries = summarize_conversations(&messages);

            let ids: Vec<Uuid> = summaries.iter().map(|s| s.conversation_id).collect();
            let owners = users::table
                .filter(users::id.eq_any(&ids))
                .load::<User>(&mut conn)?;
            let by_id: HashMap<Uuid, User> = owners.into_iter().map(|u| (u.id, u)).collect();

            // Conversations whose owner no longer resolves are dropped.
            let mut out = Vec::with_capacity(summaries.len());
            for summary in summaries {
                if let Some(owner) = by_id.get(&summary.conversation_id) {
                    out.push(ConversationApi {
                        conversation_id: summary.conversation_id.to_string(),
                        user: ConversationUserApi {
                            id: owner.id.to_string(),
                            name: owner.name.clone(),
                            email: owner.email.clone(),
                            office: owner.office.clone(),
                        },
                        last_message: summary.last_message,
                        last_message_time: summary.last_message_time,
                        unread_count: summary.unread_count,
                    });
                }
            }
            Ok(out)
        })
        .await??;

        Ok(convs)
    }

    /// Lists a conversation ascending by time, then flips the read flag on the
    /// opposite party's unread messages. When `mark_standard_senders` is true
    /// the viewer is the desk side and standard-user messages are marked;
    /// otherwise the owner is viewing and desk-side messages are marked.
    pub async fn messages_and_mark(
        conversation: Uuid,
        mark_standard_senders: bool,
        pool: &DbPool,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let conn = get_conn(pool)?;

        let messages = web::block(move || -> Result<Vec<ChatMessage>, diesel::result::Error> {
            use crate::schema::chat_messages::dsl::*;
            let mut conn = conn;

            let listed = chat_messages
                .filter(conversation_id.eq(conversation))
                .order(created_at.asc())
                .load::<ChatMessage>(&mut conn)?;

            let unread = chat_messages
                .filter(conversation_id.eq(conversation))
                .filter(read.eq(false));
            if mark_standard_senders {
                diesel::update(unread.filter(sender_role.eq(Role::Standard.as_str())))
                    .set(read.eq(true))
                    .execute(&mut conn)?;
            } else {
                diesel::update(unread.filter(sender_role.ne(Role::Standard.as_str())))
                    .set(read.eq(true))
                    .execute(&mut conn)?;
            }

            Ok(listed)
        })
        .await??;

        Ok(messages)
    }

    pub async fn send(new_message: NewChatMessage, pool: &DbPool) -> Result<Uuid, ApiError> {
        let conn = get_conn(pool)?;
        let message_id = new_message.id;

        web::block(move || {
            use crate::schema::chat_messages::dsl::*;
            let mut conn = conn;
            diesel::insert_into(chat_messages)
                .values(&new_message)
                .execute(&mut conn)
        })
        .await??;

        Ok(message_id)
    }

    pub async fn unread_count(session: &UserSession, pool: &DbPool) -> Result<i64, ApiError> {
        let conn = get_conn(pool)?;
        let session = *session;

        let count = web::block(move || {
            use crate::schema::chat_messages::dsl::*;
            let mut conn = conn;
            match session.role {
                Role::Standard => chat_messages
                    .filter(conversation_id.eq(session.id))
                    .filter(read.eq(false))
                    .filter(sender_role.ne(Role::Standard.as_str()))
                    .count()
                    .get_result::<i64>(&mut conn),
                _ => chat_messages
                    .filter(read.eq(false))
                    .filter(sender_role.eq(Role::Standard.as_str()))
                    .count()
                    .get_result::<i64>(&mut conn),
            }
        })
        .await??;

        Ok(count)
    }
}

/// Seed reference data the first time the service starts against an empty
/// database: three offices and one demo user per role.
pub async fn seed_database(pool: &DbPool) -> Result<(), ApiError> {
    let conn = get_conn(pool)?;

    web::block(move || -> Result<(), diesel::result::Error> {
        use crate::schema::{offices, users};
        let mut conn = conn;

        let existing: i64 = users::table.count().get_result(&mut conn)?;
        if existing > 0 {
            info!("Database already has users. Skipping seed.");
            return Ok(());
        }

        let now = Utc::now();
        let seed_offices = [
            ("Malaga", "Spain"),
            ("Zambujeira do Mar", "Portugal"),
            ("Val Nord", "Andorra"),
        ];
        for (office_name, office_country) in seed_offices {
            diesel::insert_into(offices::table)
                .values(&NewOffice {
                    id: Uuid::new_v4(),
                    name: office_name.to_string(),
                    country: office_country.to_string(),
                    created_at: now,
                    updated_at: now,
                })
                .execute(&mut conn)?;
        }
        info!("Created offices: Malaga, Zambujeira do Mar, Val Nord");

        let seed_users = [
            (
                "Juan",
                "standard@test.com",
                "+1234567890",
                "Spain",
                "Malaga",
                "C1R1S4",
                Role::Standard,
            ),
            (
                "Francisca",
                "servicedesk@test.com",
                "+1234567891",
                "Portugal",
                "Zambujeira do Mar",
                "C8R3S2",
                Role::ServiceDesk,
            ),
            (
                "Antonio",
                "admin@test.com",
                "+1234567892",
                "Andorra",
                "Val Nord",
                "C2R1S6",
                Role::Admin,
            ),
        ];
        for (user_name, user_email, phone, user_country, user_office, station, role) in seed_users {
            let salt = AuthService::generate_salt();
            let hashed = AuthService::hash_password("password123", &salt);
            diesel::insert_into(users::table)
                .values(&NewUser {
                    id: Uuid::new_v4(),
                    name: user_name.to_string(),
                    email: user_email.to_string(),
                    password: hashed,
                    salt,
                    role: role.as_str().to_string(),
                    office: user_office.to_string(),
                    workstation: station.to_string(),
                    country: user_country.to_string(),
                    phone_number: phone.to_string(),
                })
                .execute(&mut conn)?;
            info!("Created {}: {}", role, user_email);
        }

        info!("Seeding complete");
        Ok(())
    })
    .await??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_is_deterministic_hex() {
        let salt = "00112233445566778899aabbccddeeff";
        let a = AuthService::hash_password("password123", salt);
        let b = AuthService::hash_password("password123", salt);
        assert_eq!(a, b);
        assert_eq!(a.len(), PASSWORD_LENGTH * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = AuthService::hash_password("password124", salt);
        assert_ne!(a, other);
    }

    #[test]
    fn generated_salts_differ() {
        let a = AuthService::generate_salt();
        let b = AuthService::generate_salt();
        assert_eq!(a.len(), SALT_LENGTH * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn verify_password_round_trip() {
        let salt = AuthService::generate_salt();
        let stored = AuthService::hash_password("secret", &salt);
        assert!(AuthService::verify_password("secret", &salt, &stored));
        assert!(!AuthService::verify_password("wrong", &salt, &stored));
    }

    #[test]
    fn token_round_trip_carries_id_and_role() {
        let id = Uuid::new_v4();
        let token = AuthService::generate_token(id, Role::ServiceDesk, "test-secret").unwrap();
        let session = AuthService::verify_token(&token, "test-secret").unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.role, Role::ServiceDesk);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let token = AuthService::generate_token(Uuid::new_v4(), Role::Admin, "secret-a").unwrap();
        assert!(AuthService::verify_token(&token, "secret-b").is_err());
    }

    #[test]
    fn token_rejects_garbage() {
        assert!(AuthService::verify_token("not-a-token", "secret").is_err());
    }

    #[test]
    fn parse_id_maps_invalid_to_not_found() {
        assert!(parse_id("not-a-uuid", "Issue").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "Issue").unwrap(), id);
    }

    #[test]
    fn average_resolution_handles_empty_and_mean() {
        assert_eq!(average_resolution_ms(&[]), 0.0);

        let base = Utc::now();
        let spans = vec![
            (base, base + Duration::milliseconds(1000)),
            (base, base + Duration::milliseconds(3000)),
        ];
        assert_eq!(average_resolution_ms(&spans), 2000.0);
    }

    #[test]
    fn conversation_target_forces_own_for_standard_users() {
        let session = UserSession {
            id: Uuid::new_v4(),
            role: Role::Standard,
        };
        let supplied = Some(Uuid::new_v4());
        assert_eq!(
            ConversationTarget::for_sender(&session, supplied).unwrap(),
            session.id
        );
        assert_eq!(ConversationTarget::Own.resolve(&session).unwrap(), session.id);
    }

    #[test]
    fn conversation_target_requires_explicit_id_for_desk_side() {
        let session = UserSession {
            id: Uuid::new_v4(),
            role: Role::ServiceDesk,
        };
        assert!(ConversationTarget::for_sender(&session, None).is_err());
        assert!(ConversationTarget::Own.resolve(&session).is_err());

        let conversation = Uuid::new_v4();
        assert_eq!(
            ConversationTarget::for_sender(&session, Some(conversation)).unwrap(),
            conversation
        );
        assert_eq!(
            ConversationTarget::Explicit(conversation)
                .resolve(&session)
                .unwrap(),
            conversation
        );
    }

    fn message(
        conversation: Uuid,
        text: &str,
        role: Role,
        read: bool,
        at: DateTime<Utc>,
    ) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: conversation,
            sender_id: Uuid::new_v4(),
            sender_name: "someone".to_string(),
            sender_role: role.as_str().to_string(),
            message: text.to_string(),
            created_at: at,
            read,
        }
    }

    #[test]
    fn summarize_conversations_groups_and_counts_unread() {
        let conv_a = Uuid::new_v4();
        let conv_b = Uuid::new_v4();
        let base = Utc::now();

        let messages = vec![
            message(conv_a, "first", Role::Standard, true, base),
            message(conv_a, "second", Role::ServiceDesk, false, base + Duration::seconds(1)),
            message(conv_a, "third", Role::Standard, false, base + Duration::seconds(2)),
            message(conv_b, "hello", Role::Standard, false, base + Duration::seconds(5)),
        ];

        let summaries = summarize_conversations(&messages);
        assert_eq!(summaries.len(), 2);

        // Newest conversation first
        assert_eq!(summaries[0].conversation_id, conv_b);
        assert_eq!(summaries[0].last_message, "hello");
        assert_eq!(summaries[0].unread_count, 1);

        assert_eq!(summaries[1].conversation_id, conv_a);
        assert_eq!(summaries[1].last_message, "third");
        // Only unread standard-user messages count; the desk reply does not.
        assert_eq!(summaries[1].unread_count, 1);
    }
}
