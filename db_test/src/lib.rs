use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Run an asynchronous test against a real MongoDB instance, injecting
/// dependencies and dropping the database regardless of how the test
/// terminates.
///
/// Each test gets its own freshly created database, with indexes in place,
/// on the server named by `db_uri` (`ROCKET_DB_URI`). The tests are ignored by
/// default; run them with `cargo test -- --ignored` once a server is available.
///
/// Injectable dependencies are [`mongodb::Database`] and
/// `crate::model::mongodb::Coll<T>`.
#[proc_macro_attribute]
pub fn db_test(_: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        #[ignore = "requires MongoDB at `ROCKET_DB_URI`"]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(["facevote_backend"], None, None);

            /// The test itself.
            #item_fn

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("db-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let db = outer_runtime.block_on(crate::test_database());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();
                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(db.drop(None)).unwrap();

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, and build the expression injected for
/// each parameter.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_db = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(segment) = type_path.path.segments.last() {
                    if segment.ident == "Database" {
                        if has_db {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `mongodb::Database`",
                            ));
                        }
                        has_db = true;
                        args.push(quote! { db.clone() });
                        continue;
                    } else if segment.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &segment.arguments {
                            if let Some(GenericArgument::Type(collection_type)) =
                                generics.args.first()
                            {
                                args.push(quote! {
                                    crate::model::mongodb::Coll::<#collection_type>::from_db(&db)
                                });
                                continue;
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `db_ident: Database` or `collection_ident: Coll<T>`",
        ));
    }

    Ok(args)
}
