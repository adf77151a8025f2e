//! Basic example describing a resource and calling its endpoints.
//!
//! This example shows how to:
//! - Configure an HTTP transport and a resource factory
//! - Describe endpoints with path, query and body parameters
//! - Read decoded values, typed responses and REST errors
//!
//! Run with: `cargo run --example basic_call`

use rested::parsers::JsonParser;
use rested::{
    media, EndpointDescriptor, Error, ErrorType, HttpTransport, RequestMethod, ResourceDescriptor,
    ResourceFactory, ReturnType,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("rested=debug,basic_call=info")
        .init();

    let factory = ResourceFactory::builder()
        .transport(
            HttpTransport::builder()
                .base_url("https://jsonplaceholder.typicode.com")?
                .build()?,
        )
        .parser(JsonParser, [media::JSON])
        .build()?;

    let posts = factory.create_resource(
        ResourceDescriptor::new()
            .base_path("/posts")
            .endpoint(
                EndpointDescriptor::builder("get", RequestMethod::Get, "/{id}")
                    .path_param("id")
                    .error(404, 404, ErrorType::new("PostNotFound"))
                    .returns(ReturnType::value::<Post>())
                    .build()?,
            )
            .endpoint(
                EndpointDescriptor::builder("by_user", RequestMethod::Get, "")
                    .query("userId")
                    .returns(ReturnType::value::<Vec<Post>>())
                    .build()?,
            )
            .endpoint(
                EndpointDescriptor::builder("create", RequestMethod::Post, "")
                    .body()
                    .returns(ReturnType::response::<Post>())
                    .build()?,
            ),
    );

    println!("=== GET with a path parameter ===");
    let post: Post = posts.call("get").arg(1).value().await?;
    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!();

    println!("=== GET with a query parameter ===");
    let by_user: Vec<Post> = posts.call("by_user").arg(1).value().await?;
    println!("User 1 wrote {} posts", by_user.len());
    println!();

    println!("=== POST with a JSON body ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created = posts
        .call("create")
        .serialized_arg(&new_post)?
        .response::<Post>()
        .await?;
    println!("Created post ID: {}", created.data.id);
    println!("Status code: {}", created.status);
    println!("Content-Type: {:?}", created.header("Content-Type"));
    println!();

    println!("=== Typed REST errors ===");
    match posts.call("get").arg(100_000).value::<Post>().await {
        Ok(post) => println!("Unexpectedly found post {}", post.id),
        Err(Error::Rest(err)) if err.is("PostNotFound") => {
            println!("{}", err);
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
