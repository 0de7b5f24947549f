use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies. The server runs over in-memory collaborators, so no database
/// or provider is contacted.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::services::mock::Fakes`, the handle on the collaborators behind it.
/// Pass `admin` to log the client in as an admin first.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
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

    // Log in the client as admin if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        None => quote! {},
        Some(arg) if arg == "admin" => quote! {
            crate::services::AdminRepository::insert(
                fakes.admins.as_ref(),
                crate::model::db::admin::NewAdmin::example(),
            )
            .await
            .unwrap();

            let status = rocket_client
                .post(uri!(crate::api::auth::login))
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::api::admin::AdminCredentials::example()).to_string())
                .dispatch()
                .await
                .status();
            assert_eq!(rocket::http::Status::Ok, status, "admin login failed");
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or no argument")
                .into_compile_error()
                .into();
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(["facevote_backend"], None, None);

            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, crate::services::mock::Fakes) {
                let fakes = crate::services::mock::Fakes::new();
                let rocket_client = rocket::local::asynchronous::Client::tracked(fakes.rocket())
                    .await
                    .unwrap();

                #maybe_login

                (rocket_client, fakes)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, fakes) = setup().await;
                #new_name(#(#test_args),*).await
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_fakes = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                    if type_ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    } else if type_ident == "Fakes" {
                        if has_fakes {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Fakes`",
                            ));
                        }
                        has_fakes = true;
                        args.push(quote! { fakes });
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `fakes_ident: Fakes`",
        ));
    }

    Ok(args)
}
