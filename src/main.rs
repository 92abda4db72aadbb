use actix_files::Files;
use actix_web::{web, App, HttpServer};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel::Connection;
use log::{error, info, warn};

use fixdesk::config::{AppConfig, DB_INIT_SQL};
use fixdesk::handlers;
use fixdesk::logger::setup_logger;
use fixdesk::middleware::{AuthGate, RequestLogger, RoleGate};
use fixdesk::services::seed_database;
use fixdesk::vision::VisionClient;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    setup_logger();

    // Load and validate configuration
    let config = AppConfig::from_env();
    if let Err(e) = config.validate() {
        error!("Configuration validation error: {}", e);
        panic!("Invalid configuration: {}", e);
    }

    // Initialize database schema
    info!("Connecting to database: {}", config.database_url);
    let mut conn = PgConnection::establish(&config.database_url)
        .expect("Failed to establish connection for schema initialization");
    conn.batch_execute(DB_INIT_SQL)
        .expect("Failed to execute database initialization script");
    info!("Database initialization complete.");

    // Set up database connection pool
    let manager = ConnectionManager::<PgConnection>::new(config.database_url.clone());
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create database connection pool");

    if let Err(e) = seed_database(&pool).await {
        error!("Database seeding failed: {}", e);
    }

    // Vision enrichment is optional; the service runs fine without it.
    let vision = VisionClient::from_credentials_file(config.vision_credentials.as_deref());
    if vision.is_none() {
        warn!("AI image analysis disabled");
    }

    let issue_uploads = config.upload_dir.join("issues");
    std::fs::create_dir_all(&issue_uploads).expect("Failed to create upload directory");

    let host = config.host.clone();
    let port = config.port;
    info!("Starting HTTP server at http://{}:{}", host, port);

    HttpServer::new(move || {
        let secret = config.auth_secret.clone();
        App::new()
            // Enable request logger middleware
            .wrap(RequestLogger)
            // Register app data
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(vision.clone()))
            .service(handlers::health_check)
            .service(Files::new("/uploads", config.upload_dir.clone()))
            .service(
                web::scope("/api/security")
                    .service(handlers::login)
                    .service(handlers::logout),
            )
            .service(
                web::scope("/api/standard-user")
                    .wrap(AuthGate::new(secret.clone()))
                    .service(handlers::get_profile)
                    .service(handlers::update_profile)
                    .service(handlers::list_office_options),
            )
            .service(
                web::scope("/api/issues")
                    .wrap(AuthGate::new(secret.clone()))
                    .service(handlers::create_issue)
                    .service(handlers::list_issues)
                    .service(handlers::get_issue)
                    .service(handlers::update_issue)
                    .service(handlers::delete_issue),
            )
            .service(
                web::scope("/api/chat")
                    .wrap(AuthGate::new(secret.clone()))
                    .service(handlers::list_conversations)
                    .service(handlers::get_own_messages)
                    .service(handlers::get_conversation_messages)
                    .service(handlers::send_message)
                    .service(handlers::get_unread_count),
            )
            // Wraps run outside-in from the last registered: AuthGate attaches
            // the session, then RoleGate checks it.
            .service(
                web::scope("/api/admin")
                    .wrap(RoleGate::admin_only())
                    .wrap(AuthGate::new(secret))
                    .service(handlers::get_analytics)
                    .service(handlers::list_users)
                    .service(handlers::create_user)
                    .service(handlers::admin_update_user)
                    .service(handlers::admin_delete_user)
                    .service(handlers::list_offices)
                    .service(handlers::create_office)
                    .service(handlers::update_office)
                    .service(handlers::delete_office),
            )
    })
    .workers(2) // Specify number of workers
    .keep_alive(std::time::Duration::from_secs(75)) // Configure keep-alive
    .shutdown_timeout(30) // Graceful shutdown timeout in seconds
    .bind((host, port))?
    .run()
    .await
}
