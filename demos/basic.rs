//! Minimal action-svc example: a small pet store behind one endpoint.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl 'http://localhost:3000/?Action=ListPets&Limit=2'
//!   curl -X POST http://localhost:3000/ \
//!        -H 'X-Action: CreatePet' -H 'X-Request-Id: r-1' \
//!        -d '{"Name":"rex"}'
//!   curl 'http://localhost:3000/?Action=GetPets'     # alias of ListPets
//!   curl 'http://localhost:3000/?Action=Nope'        # InvalidAction

use std::sync::Arc;

use action_svc::{Context, Error, HandlerError, Server, Service, middleware};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Pet {
    id: u64,
    name: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListPets {
    #[serde(default)]
    limit: usize,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatePet {
    #[serde(default)]
    name: String,
}

type Store = Arc<RwLock<Vec<Pet>>>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let store: Store = Arc::default();

    let svc = Service::builder()
        .context_factory(|| {
            let mut ctx = Context::new();
            ctx.set_default = Some(Arc::new(|v: &mut dyn std::any::Any| -> Result<(), HandlerError> {
                if let Some(list) = v.downcast_mut::<ListPets>() {
                    if list.limit == 0 {
                        list.limit = 10;
                    }
                }
                Ok(())
            }));
            ctx.validate = Some(Arc::new(|v: &mut dyn std::any::Any| -> Result<(), HandlerError> {
                match v.downcast_ref::<CreatePet>() {
                    Some(pet) if pet.name.is_empty() => Err("Name is required".into()),
                    _ => Ok(()),
                }
            }));
            ctx
        })
        .build();
    let svc = Arc::new(svc);

    svc.use_middleware(&[middleware::trace()]);

    let pets = Arc::clone(&store);
    svc.register("ListPets", move |c| {
        let mut args = ListPets::default();
        c.bind(&mut args)?;
        let page: Vec<Pet> = pets.read().iter().take(args.limit).cloned().collect();
        c.success(&page)
    });

    let pets = Arc::clone(&store);
    svc.register("CreatePet", move |c| create_pet(c, &pets));
    svc.mapping("GetPets", "ListPets");

    let server = match Server::bind("0.0.0.0:3000") {
        Ok(server) => server,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };
    if let Err(e) = server.serve(svc).await {
        eprintln!("server error: {e}");
    }
}

fn create_pet(c: &mut Context, store: &Store) -> Result<(), HandlerError> {
    let mut args = CreatePet::default();
    c.bind(&mut args)?;

    let mut pets = store.write();
    if pets.iter().any(|p| p.name == args.name) {
        return Err(Error::new("PetExists", format!("pet '{}' already exists", args.name)).into());
    }
    let pet = Pet { id: pets.len() as u64 + 1, name: args.name };
    pets.push(pet.clone());
    drop(pets);

    c.success(&pet)
}
