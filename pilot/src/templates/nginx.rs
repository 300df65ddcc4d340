//! Static site served by nginx

use async_trait::async_trait;

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::models::resource::Resource;
use crate::templates::Template;

const DOCKERFILE: &str = r#"FROM nginx:alpine
RUN rm -rf /usr/share/nginx/html/*
COPY app /usr/share/nginx/html
COPY app/nginx.conf /etc/nginx/nginx.conf
CMD ["nginx", "-g", "daemon off;"]
"#;

pub struct NginxTemplate;

impl NginxTemplate {
    fn config(resource: &Resource, port: u16) -> String {
        let server_name = resource.prop("serverName").or_else(|| resource.prop("server_name"));
        let index = resource.handler.as_deref().unwrap_or("index.html index.htm");

        let mut text = format!(
            r#"user nginx;
worker_processes auto;
events {{
    worker_connections 1024;
}}
http {{
    include       mime.types;
    default_type  application/octet-stream;
    sendfile        on;
    keepalive_timeout  65;
    server {{
        listen {port};
        server_name {server_name};
        root   /usr/share/nginx/html;
        index  {index};
        location / {{
            try_files $uri $uri/ =404;
        }}
    }}
"#,
            port = port,
            server_name = server_name.unwrap_or("_"),
            index = index,
        );

        // Reject requests for any other host name
        if server_name.is_some() {
            text.push_str(
                r#"    server {
        listen 80 default_server;
        server_name _;
        return 403;
    }
"#,
            );
        }
        text.push_str("}\n");
        text
    }
}

#[async_trait]
impl Template for NginxTemplate {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn default_port(&self) -> Option<u16> {
        Some(80)
    }

    fn dockerfile(&self) -> &'static str {
        DOCKERFILE
    }

    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError> {
        let port = self.container_port(resource).unwrap_or(80);
        let text = Self::config(resource, port);
        Dir::new(&resource.folders.deploy)
            .file("nginx.conf")
            .write_string(&text)
            .await
    }
}
