use crate::{api, setting::Setting, Publisher, Result, Service};
use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest},
    middleware, web, App as WebApp, HttpServer,
};
use sea_orm::{ConnectOptions, Database, DbConn};
use std::{path::Path, sync::Arc};
use tracing::info;

pub struct AppState {
    pub service: Service,
    pub setting: Setting,
    /// none if nostr publishing is disabled
    pub publisher: Option<Arc<Publisher>>,
}

impl AppState {
    pub async fn create<P: AsRef<Path>>(
        setting_path: Option<P>,
        setting_env_prefix: Option<String>,
    ) -> Result<Self> {
        let env_notice = setting_env_prefix
            .as_ref()
            .map(|s| {
                format!(
                    ", config will be overridden by ENV settings with prefix `{}_`",
                    s
                )
            })
            .unwrap_or_default();

        let setting = if let Some(path) = setting_path {
            info!("Load config {:?}{}", path.as_ref(), env_notice);
            Setting::read(path.as_ref(), setting_env_prefix)?
        } else if let Some(prefix) = setting_env_prefix {
            info!("Load default config{}", env_notice);
            Setting::from_env(prefix)?
        } else {
            info!("Load default config");
            Setting::default()
        };

        info!(
            db_url = setting.db_url.as_str(),
            publish = setting.publish.enabled,
            relays = setting.publish.relays.len(),
            admins = setting.admin.pubkeys.len(),
            "setting loaded"
        );

        Self::from_setting(setting).await
    }

    /// Connect the database and create the publisher when enabled.
    pub async fn from_setting(setting: Setting) -> Result<Self> {
        let conn = connect_db(&setting.db_url).await?;
        let service = Service::new(conn);
        let publisher = if setting.publish.enabled {
            let publisher = Publisher::from_setting(service.clone(), &setting.publish)?;
            info!(
                pubkey = publisher.client().keys().public_key().to_string(),
                relays = ?setting.publish.relays,
                "nostr publishing enabled"
            );
            Some(Arc::new(publisher))
        } else {
            info!("nostr publishing disabled");
            None
        };

        Ok(Self {
            service,
            setting,
            publisher,
        })
    }
}

pub async fn connect_db(db_url: &str) -> Result<DbConn> {
    let mut options = ConnectOptions::new(db_url.to_owned());
    options.sqlx_logging_level(tracing::log::LevelFilter::Trace);
    if db_url.contains(":memory:") {
        // every connection of an in-memory sqlite pool is a new database
        options.max_connections(1).min_connections(1);
    }
    Ok(Database::connect(options).await?)
}

pub fn create_web_app(
    data: web::Data<AppState>,
) -> WebApp<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    WebApp::new()
        .app_data(data)
        .wrap(middleware::Logger::default()) // enable logger
        .service(
            api::scope().wrap(
                Cors::default()
                    .allow_any_header()
                    .allow_any_origin()
                    .allow_any_method()
                    .max_age(86_400),
            ),
        )
}

/// start app
pub async fn start(state: AppState) -> Result<()> {
    let state = web::Data::new(state);

    let c_data = state.clone();
    let server = HttpServer::new(move || create_web_app(c_data.clone()));
    let num = if state.setting.thread.http == 0 {
        num_cpus::get()
    } else {
        state.setting.thread.http
    };
    let host = state.setting.network.host.clone();
    let port = state.setting.network.port;
    info!("Start http server {}:{}", host, port);
    server.workers(num).bind((host, port))?.run().await?;
    Ok(())
}
