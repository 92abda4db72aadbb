use actix_multipart::{Field, Multipart};
use actix_web::cookie::Cookie;
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::{AppConfig, DbPool};
use crate::errors::ApiError;
use crate::middleware::{UserSession, AUTH_COOKIE, AUTH_SCHEME};
use crate::models::*;
use crate::services::{
    parse_id, AnalyticsData, AuthService, ChatService, ConversationTarget, IssueService,
    OfficeService, UserService,
};
use crate::vision::VisionClient;

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const ALLOWED_IMAGE_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "gif"];

#[get("/api/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// --- Security ---

fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_COOKIE, "");
    cookie.set_path("/");
    cookie.make_removal();
    cookie
}

#[post("/login")]
pub async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    login_data: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    debug!("Login attempt for user: {}", login_data.email);

    let user = match UserService::find_by_email(&login_data.email, &pool).await? {
        Some(user) => user,
        None => {
            debug!("Login failed: no user with email {}", login_data.email);
            return Ok(HttpResponse::Unauthorized()
                .cookie(removal_cookie())
                .json(json!({ "error": "Invalid credentials" })));
        }
    };

    if !AuthService::verify_password(&login_data.password, &user.salt, &user.password) {
        debug!("Login failed: invalid password for {}", login_data.email);
        return Ok(HttpResponse::Unauthorized()
            .cookie(removal_cookie())
            .json(json!({ "error": "Invalid credentials" })));
    }

    let role = Role::parse(&user.role).ok_or_else(|| {
        error!("User {} has unknown role {:?}", user.id, user.role);
        ApiError::InternalError("Corrupt user record".to_string())
    })?;

    let token = AuthService::generate_token(user.id, role, &config.auth_secret)?;
    let cookie = Cookie::build(AUTH_COOKIE, format!("{} {}", AUTH_SCHEME, token))
        .path("/")
        .http_only(true)
        .finish();

    info!("User {} logged in successfully", user.email);
    Ok(HttpResponse::NoContent().cookie(cookie).finish())
}

#[post("/logout")]
pub async fn logout() -> impl Responder {
    HttpResponse::Ok()
        .cookie(removal_cookie())
        .json(json!({ "message": "Logged out successfully" }))
}

// --- Standard user ---

#[get("/profile")]
pub async fn get_profile(
    session: UserSession,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let user = UserService::get_by_id(session.id, &pool)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("User not found".to_string()))?;

    Ok(HttpResponse::Ok().json(ProfileApi::from(&user)))
}

#[put("/profile")]
pub async fn update_profile(
    session: UserSession,
    pool: web::Data<DbPool>,
    update: web::Json<ProfileUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let changes = update.into_inner().into_changeset();
    if changes.is_empty() {
        return Err(ApiError::ValidationError("No fields to update".to_string()));
    }

    let updated = UserService::update_profile(session.id, changes, &pool).await?;
    if updated == 0 {
        return Err(ApiError::NotFoundError("User not found".to_string()));
    }

    debug!("User {} updated their profile", session.id);
    Ok(HttpResponse::NoContent().finish())
}

/// Office picker for the profile form: names and countries only.
#[get("/offices")]
pub async fn list_office_options(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let offices = OfficeService::list_all(&pool).await?;
    let options: Vec<serde_json::Value> = offices
        .iter()
        .map(|o| json!({ "name": o.name, "country": o.country }))
        .collect();
    Ok(HttpResponse::Ok().json(options))
}

// --- Issues ---

fn multipart_err(e: actix_multipart::MultipartError) -> ApiError {
    warn!("Multipart payload error: {}", e);
    ApiError::ValidationError("Invalid upload payload".to_string())
}

async fn read_text_field(field: &mut Field) -> Result<String, ApiError> {
    let mut bytes = web::BytesMut::new();
    while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ApiError::ValidationError("Field must be valid UTF-8".to_string()))
}

/// Validated lowercase extension for an uploaded image, or None when either
/// the filename or the declared content type is not an accepted image format.
fn image_extension(filename: &str, content_type: Option<&mime::Mime>) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_lowercase();
    if !ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    match content_type {
        Some(ct)
            if ct.type_() == mime::IMAGE
                && ALLOWED_IMAGE_EXTENSIONS.contains(&ct.subtype().as_str()) =>
        {
            Some(ext)
        }
        _ => None,
    }
}

/// Stream an image field to disk under `<upload_dir>/issues/`, enforcing the
/// size cap as chunks arrive. Returns the disk path and the public URL.
async fn save_image_field(
    field: &mut Field,
    upload_dir: &Path,
) -> Result<(PathBuf, String), ApiError> {
    let filename = field
        .content_disposition()
        .get_filename()
        .unwrap_or("")
        .to_string();
    let ext = image_extension(&filename, field.content_type()).ok_or_else(|| {
        ApiError::ValidationError("Only image files are allowed".to_string())
    })?;

    let unique = format!(
        "issue-{}-{}.{}",
        Utc::now().timestamp_millis(),
        rand::thread_rng().gen_range(0..1_000_000_000u32),
        ext
    );
    let path = upload_dir.join("issues").join(&unique);

    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create upload file {}: {}", path.display(), e);
        ApiError::InternalError("Failed to store image".to_string())
    })?;

    let mut written = 0usize;
    let mut too_large = false;
    while let Some(chunk) = field.try_next().await.map_err(multipart_err)? {
        written += chunk.len();
        if written > MAX_IMAGE_BYTES {
            too_large = true;
            break;
        }
        file.write_all(&chunk).await.map_err(|e| {
            error!("Failed to write upload file {}: {}", path.display(), e);
            ApiError::InternalError("Failed to store image".to_string())
        })?;
    }

    if too_large {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(ApiError::ValidationError(
            "Image exceeds the 5MB limit".to_string(),
        ));
    }

    file.flush().await.map_err(|e| {
        error!("Failed to flush upload file {}: {}", path.display(), e);
        ApiError::InternalError("Failed to store image".to_string())
    })?;

    Ok((path, format!("/uploads/issues/{}", unique)))
}

async fn discard_upload(saved: &Option<(PathBuf, String)>) {
    if let Some((path, _)) = saved {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove discarded upload {}: {}", path.display(), e);
        }
    }
}

#[post("")]
pub async fn create_issue(
    session: UserSession,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    vision: web::Data<Option<VisionClient>>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut description: Option<String> = None;
    let mut raw_priority: Option<String> = None;
    let mut location: Option<serde_json::Value> = None;
    let mut saved_image: Option<(PathBuf, String)> = None;

    let ingest = async {
        while let Some(mut field) = payload.try_next().await.map_err(multipart_err)? {
            let name = field
                .content_disposition()
                .get_name()
                .unwrap_or("")
                .to_string();
            match name.as_str() {
                "description" => description = Some(read_text_field(&mut field).await?),
                "priority" => raw_priority = Some(read_text_field(&mut field).await?),
                "location" => {
                    let raw = read_text_field(&mut field).await?;
                    match serde_json::from_str::<IssueLocation>(&raw) {
                        Ok(loc) => location = serde_json::to_value(loc).ok(),
                        // A bad location never fails the report.
                        Err(e) => warn!("Ignoring unparseable location payload: {}", e),
                    }
                }
                "image" => {
                    if saved_image.is_some() {
                        return Err(ApiError::ValidationError(
                            "Only one image is allowed".to_string(),
                        ));
                    }
                    saved_image = Some(save_image_field(&mut field, &config.upload_dir).await?);
                }
                other => debug!("Ignoring unexpected multipart field {:?}", other),
            }
        }
        Ok::<(), ApiError>(())
    };

    // A field error after the image landed on disk must not leak the file.
    if let Err(e) = ingest.await {
        discard_upload(&saved_image).await;
        return Err(e);
    }

    let description = match description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
    {
        Some(d) => d,
        None => {
            discard_upload(&saved_image).await;
            return Err(ApiError::ValidationError(
                "Description is required".to_string(),
            ));
        }
    };

    let priority = match raw_priority {
        None => IssuePriority::Medium,
        Some(raw) => match IssuePriority::parse(raw.trim()) {
            Some(p) => p,
            None => {
                discard_upload(&saved_image).await;
                return Err(ApiError::ValidationError("Invalid priority".to_string()));
            }
        },
    };

    // Reporter snapshot is taken at creation time; the issue keeps it even if
    // the account is deleted later.
    let reporter = match UserService::get_by_id(session.id, &pool).await? {
        Some(user) => user,
        None => {
            discard_upload(&saved_image).await;
            return Err(ApiError::AuthError("User not found".to_string()));
        }
    };

    let ai_metadata = match (&saved_image, vision.get_ref().as_ref()) {
        (Some((path, _)), Some(client)) => client
            .analyze(path)
            .await
            .and_then(|meta| serde_json::to_value(meta).ok()),
        _ => None,
    };

    let now = Utc::now();
    let new_issue = NewIssue {
        id: Uuid::new_v4(),
        description,
        image_url: saved_image.as_ref().map(|(_, url)| url.clone()),
        status: IssueStatus::Open.as_str().to_string(),
        priority: priority.as_str().to_string(),
        created_by_id: reporter.id,
        created_by_name: reporter.name,
        created_by_email: reporter.email,
        location,
        ai_metadata,
        created_at: now,
        updated_at: now,
    };

    let issue_id = IssueService::create(new_issue, &pool).await?;
    Ok(HttpResponse::Created().json(json!({
        "id": issue_id.to_string(),
        "message": "Issue reported successfully"
    })))
}

#[get("")]
pub async fn list_issues(
    session: UserSession,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    session.require(&[Role::ServiceDesk, Role::Admin])?;

    let issues = IssueService::list_all(&pool).await?;
    let out: Vec<IssueApi> = issues.into_iter().map(IssueApi::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

#[get("/{id}")]
pub async fn get_issue(
    session: UserSession,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let issue_id = parse_id(&path, "Issue")?;
    let issue = IssueService::get_by_id(issue_id, &pool)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("Issue not found".to_string()))?;

    // Standard users may only read their own reports.
    if session.role == Role::Standard && issue.created_by_id != session.id {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    Ok(HttpResponse::Ok().json(IssueApi::from(issue)))
}

#[put("/{id}")]
pub async fn update_issue(
    session: UserSession,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    update: web::Json<IssueUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    session.require(&[Role::ServiceDesk, Role::Admin])?;

    let issue_id = parse_id(&path, "Issue")?;
    let update = update.into_inner();
    if update.description.is_none()
        && update.status.is_none()
        && update.priority.is_none()
        && update.assigned_to.is_none()
    {
        return Err(ApiError::ValidationError("No fields to update".to_string()));
    }

    let changes = IssueChangeset {
        description: update.description,
        status: update.status.map(|s| s.as_str().to_string()),
        priority: update.priority.map(|p| p.as_str().to_string()),
        assigned_to: update.assigned_to,
        updated_at: Utc::now(),
    };

    let updated = IssueService::update(issue_id, changes, &pool).await?;
    if updated == 0 {
        return Err(ApiError::NotFoundError("Issue not found".to_string()));
    }

    info!("Issue {} updated by {}", issue_id, session.id);
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/{id}")]
pub async fn delete_issue(
    session: UserSession,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    session.require(&[Role::Admin])?;

    let issue_id = parse_id(&path, "Issue")?;
    let deleted = IssueService::delete(issue_id, &pool).await?;
    if deleted == 0 {
        return Err(ApiError::NotFoundError("Issue not found".to_string()));
    }

    info!("Issue {} deleted by {}", issue_id, session.id);
    Ok(HttpResponse::NoContent().finish())
}

// --- Admin ---

fn analytics_response(data: &AnalyticsData) -> serde_json::Value {
    json!({
        "summary": {
            "totalUsers": data.total_users,
            "totalIssues": data.total_issues,
            "totalOffices": data.total_offices,
            "openIssues": data.open_issues,
            "inProgressIssues": data.in_progress_issues,
            "resolvedIssues": data.resolved_issues,
            "highPriority": data.high_priority,
            "mediumPriority": data.medium_priority,
            "lowPriority": data.low_priority,
            "avgResolutionTimeMs": data.avg_resolution_time_ms,
        },
        "issuesByOffice": data
            .issues_by_office
            .iter()
            .map(|(office, count)| json!({ "office": office, "count": count }))
            .collect::<Vec<_>>(),
        "recentIssues": data
            .recent_issues
            .iter()
            .map(|issue| json!({
                "id": issue.id.to_string(),
                "description": issue.description,
                "status": issue.status,
                "priority": issue.priority,
                "createdBy": {
                    "userId": issue.created_by_id.to_string(),
                    "name": issue.created_by_name,
                    "email": issue.created_by_email,
                },
                "createdAt": issue.created_at,
            }))
            .collect::<Vec<_>>(),
    })
}

#[get("/analytics")]
pub async fn get_analytics(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let data = IssueService::analytics(&pool).await?;
    Ok(HttpResponse::Ok().json(analytics_response(&data)))
}

#[get("/users")]
pub async fn list_users(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let users = UserService::list_all(&pool).await?;
    let out: Vec<UserApi> = users.iter().map(UserApi::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

#[post("/users")]
pub async fn create_user(
    pool: web::Data<DbPool>,
    user_data: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    debug!("Create user request received for email: {}", user_data.email);
    let user_data = user_data.into_inner();

    if user_data.name.trim().is_empty()
        || user_data.email.trim().is_empty()
        || user_data.password.is_empty()
    {
        return Err(ApiError::ValidationError(
            "Name, email and password are required".to_string(),
        ));
    }

    if UserService::find_by_email(&user_data.email, &pool)
        .await?
        .is_some()
    {
        return Err(ApiError::ValidationError("User already exists".to_string()));
    }

    let salt = AuthService::generate_salt();
    let hashed = AuthService::hash_password(&user_data.password, &salt);
    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: user_data.name,
        email: user_data.email,
        password: hashed,
        salt,
        role: user_data.role.as_str().to_string(),
        office: user_data.office,
        workstation: user_data.workstation.unwrap_or_default(),
        country: user_data.country.unwrap_or_default(),
        phone_number: user_data.phone_number.unwrap_or_default(),
    };

    let user_id = UserService::create(new_user, &pool).await?;
    Ok(HttpResponse::Created().json(json!({
        "id": user_id.to_string(),
        "message": "User created successfully"
    })))
}

#[put("/users/{id}")]
pub async fn admin_update_user(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    update: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_id(&path, "User")?;
    let changes = update.into_inner().into_changeset();
    if changes.is_empty() {
        return Err(ApiError::ValidationError("No fields to update".to_string()));
    }

    let updated = UserService::admin_update(user_id, changes, &pool).await?;
    if updated == 0 {
        return Err(ApiError::NotFoundError("User not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "User updated successfully" })))
}

#[delete("/users/{id}")]
pub async fn admin_delete_user(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = parse_id(&path, "User")?;
    let deleted = UserService::delete(user_id, &pool).await?;
    if deleted == 0 {
        return Err(ApiError::NotFoundError("User not found".to_string()));
    }

    info!("User {} deleted", user_id);
    Ok(HttpResponse::Ok().json(json!({ "message": "User deleted successfully" })))
}

#[get("/offices")]
pub async fn list_offices(pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let offices = OfficeService::list_all(&pool).await?;
    let out: Vec<OfficeApi> = offices.iter().map(OfficeApi::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

#[post("/offices")]
pub async fn create_office(
    pool: web::Data<DbPool>,
    office_data: web::Json<CreateOfficeRequest>,
) -> Result<HttpResponse, ApiError> {
    let office_data = office_data.into_inner();
    if office_data.name.trim().is_empty() || office_data.country.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "Name and country are required".to_string(),
        ));
    }

    if OfficeService::find_by_name(&office_data.name, &pool)
        .await?
        .is_some()
    {
        return Err(ApiError::ValidationError(
            "Office already exists".to_string(),
        ));
    }

    let now = Utc::now();
    let new_office = NewOffice {
        id: Uuid::new_v4(),
        name: office_data.name,
        country: office_data.country,
        created_at: now,
        updated_at: now,
    };

    let office_id = OfficeService::create(new_office, &pool).await?;
    Ok(HttpResponse::Created().json(json!({
        "id": office_id.to_string(),
        "message": "Office created successfully"
    })))
}

#[put("/offices/{id}")]
pub async fn update_office(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    update: web::Json<UpdateOfficeRequest>,
) -> Result<HttpResponse, ApiError> {
    let office_id = parse_id(&path, "Office")?;
    let update = update.into_inner();
    if update.name.is_none() && update.country.is_none() {
        return Err(ApiError::ValidationError("No fields to update".to_string()));
    }

    let changes = OfficeChangeset {
        name: update.name,
        country: update.country,
        updated_at: Utc::now(),
    };

    let updated = OfficeService::update(office_id, changes, &pool).await?;
    if updated == 0 {
        return Err(ApiError::NotFoundError("Office not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "Office updated successfully" })))
}

#[delete("/offices/{id}")]
pub async fn delete_office(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let office_id = parse_id(&path, "Office")?;
    let deleted = OfficeService::delete(office_id, &pool).await?;
    if deleted == 0 {
        return Err(ApiError::NotFoundError("Office not found".to_string()));
    }

    info!("Office {} deleted", office_id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Office deleted successfully" })))
}

// --- Chat ---

#[get("/conversations")]
pub async fn list_conversations(
    session: UserSession,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    session.require(&[Role::ServiceDesk, Role::Admin])?;

    let conversations = ChatService::conversations(&pool).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

/// Standard users read their own conversation; viewing marks the desk side's
/// messages as read.
#[get("/messages")]
pub async fn get_own_messages(
    session: UserSession,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let conversation = ConversationTarget::Own.resolve(&session)?;
    let messages = ChatService::messages_and_mark(conversation, false, &pool).await?;
    let out: Vec<ChatMessageApi> = messages.iter().map(ChatMessageApi::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

/// Reads a conversation by id (the desk side's view); viewing marks the
/// standard user's messages as read.
#[get("/messages/{conversation_id}")]
pub async fn get_conversation_messages(
    session: UserSession,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let conversation_id = parse_id(&path, "Conversation")?;
    let conversation = ConversationTarget::Explicit(conversation_id).resolve(&session)?;
    let messages = ChatService::messages_and_mark(conversation, true, &pool).await?;
    let out: Vec<ChatMessageApi> = messages.iter().map(ChatMessageApi::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

#[post("/messages")]
pub async fn send_message(
    session: UserSession,
    pool: web::Data<DbPool>,
    message_data: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    let message_data = message_data.into_inner();
    let text = message_data.message.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::ValidationError("Message is required".to_string()));
    }

    let conversation = ConversationTarget::for_sender(&session, message_data.conversation_id)?;

    let sender = UserService::get_by_id(session.id, &pool)
        .await?
        .ok_or_else(|| ApiError::NotFoundError("User not found".to_string()))?;

    let new_message = NewChatMessage {
        id: Uuid::new_v4(),
        conversation_id: conversation,
        sender_id: sender.id,
        sender_name: sender.name,
        sender_role: sender.role,
        message: text,
        created_at: Utc::now(),
        read: false,
    };

    let message_id = ChatService::send(new_message, &pool).await?;
    Ok(HttpResponse::Created().json(json!({
        "id": message_id.to_string(),
        "message": "Message sent successfully"
    })))
}

#[get("/unread-count")]
pub async fn get_unread_count(
    session: UserSession,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let count = ChatService::unread_count(&session, &pool).await?;
    Ok(HttpResponse::Ok().json(json!({ "unreadCount": count })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[::core::prelude::v1::test]
    fn image_extension_requires_matching_name_and_type() {
        let jpeg: mime::Mime = "image/jpeg".parse().unwrap();
        assert_eq!(
            image_extension("photo.JPG", Some(&jpeg)),
            Some("jpg".to_string())
        );
        assert_eq!(
            image_extension("photo.png", Some(&"image/png".parse().unwrap())),
            Some("png".to_string())
        );

        // Wrong or missing content type
        assert_eq!(image_extension("photo.jpg", None), None);
        assert_eq!(
            image_extension("photo.jpg", Some(&"application/pdf".parse().unwrap())),
            None
        );

        // Disallowed or missing extension
        assert_eq!(image_extension("report.pdf", Some(&jpeg)), None);
        assert_eq!(image_extension("noextension", Some(&jpeg)), None);
    }

    #[::core::prelude::v1::test]
    fn analytics_response_shape() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let reporter = Uuid::new_v4();
        let data = AnalyticsData {
            total_users: 3,
            total_issues: 2,
            total_offices: 3,
            open_issues: 1,
            in_progress_issues: 0,
            resolved_issues: 1,
            high_priority: 1,
            medium_priority: 1,
            low_priority: 0,
            avg_resolution_time_ms: 1500.0,
            issues_by_office: vec![("Malaga".to_string(), 2)],
            recent_issues: vec![Issue {
                id: Uuid::new_v4(),
                description: "Broken chair".to_string(),
                image_url: None,
                status: "open".to_string(),
                priority: "high".to_string(),
                created_by_id: reporter,
                created_by_name: "Juan".to_string(),
                created_by_email: "standard@test.com".to_string(),
                assigned_to: None,
                location: None,
                ai_metadata: None,
                created_at: created,
                updated_at: created,
            }],
        };

        let body = analytics_response(&data);
        assert_eq!(body["summary"]["totalUsers"], 3);
        assert_eq!(body["summary"]["avgResolutionTimeMs"], 1500.0);
        assert_eq!(body["issuesByOffice"][0]["office"], "Malaga");
        assert_eq!(body["issuesByOffice"][0]["count"], 2);
        assert_eq!(body["recentIssues"][0]["createdBy"]["userId"], reporter.to_string());
        assert_eq!(body["recentIssues"][0]["createdBy"]["name"], "Juan");
        assert!(body["recentIssues"][0].get("imageUrl").is_none());
    }

    #[::core::prelude::v1::test]
    fn removal_cookie_expires_the_session() {
        let cookie = removal_cookie();
        assert_eq!(cookie.name(), AUTH_COOKIE);
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
    }

    use crate::middleware::AuthGate;
    use crate::services::AuthService;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    const SECRET: &str = "test-secret";

    // A pool pointed at nothing: requests that reach the store fail with a
    // 500 instead of hanging.
    fn dead_pool() -> DbPool {
        let manager = diesel::r2d2::ConnectionManager::<diesel::PgConnection>::new(
            "postgres://127.0.0.1:1/unreachable",
        );
        diesel::r2d2::Pool::builder()
            .connection_timeout(std::time::Duration::from_millis(50))
            .build_unchecked(manager)
    }

    fn session_cookie(role: Role) -> Cookie<'static> {
        let token = AuthService::generate_token(Uuid::new_v4(), role, SECRET).unwrap();
        Cookie::new(AUTH_COOKIE, format!("{} {}", AUTH_SCHEME, token))
    }

    #[actix_web::test]
    async fn conversation_listing_is_open_to_standard_viewers() {
        let app = test::init_service(
            App::new().app_data(web::Data::new(dead_pool())).service(
                web::scope("/api/chat")
                    .wrap(AuthGate::new(SECRET))
                    .service(get_conversation_messages),
            ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/chat/messages/{}", Uuid::new_v4()))
            .cookie(session_cookie(Role::Standard))
            .to_request();
        let res = test::call_service(&app, req).await;

        // The request must reach the store (down here, hence 500) rather
        // than be cut off with a 403.
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn failed_report_cleans_up_stored_image() {
        let upload_dir = std::env::temp_dir().join(format!("issue-uploads-{}", Uuid::new_v4()));
        std::fs::create_dir_all(upload_dir.join("issues")).unwrap();

        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "postgres://127.0.0.1:1/unreachable".to_string(),
            auth_secret: SECRET.to_string(),
            upload_dir: upload_dir.clone(),
            vision_credentials: None,
        };

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(dead_pool()))
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(None::<VisionClient>))
                .service(
                    web::scope("/api/issues")
                        .wrap(AuthGate::new(SECRET))
                        .service(create_issue),
                ),
        )
        .await;

        // An image field followed by a description that is not valid UTF-8:
        // the upload lands on disk before the bad field is seen.
        let boundary = "issue-report-test";
        let mut body: Vec<u8> = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo.png\"\r\nContent-Type: image/png\r\n\r\n",
                boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&[137, 80, 78, 71]);
        body.extend_from_slice(
            format!(
                "\r\n--{}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\n",
                boundary
            )
            .as_bytes(),
        );
        body.extend_from_slice(&[0xff, 0xfe, 0x00, 0xff]);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let req = test::TestRequest::post()
            .uri("/api/issues")
            .cookie(session_cookie(Role::Standard))
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let leftovers: Vec<_> = std::fs::read_dir(upload_dir.join("issues"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&upload_dir);
    }
}
