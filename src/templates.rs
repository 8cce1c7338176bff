use tera::Tera;

macro_rules! embedded {
    ($($name:literal),* $(,)?) => {
        vec![$(($name, include_str!(concat!("../templates/", $name)))),*]
    };
}

/// Builds the template set compiled into the binary.
pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(embedded![
        "base.html",
        "includes/paginator.html",
        "includes/post_item.html",
        "includes/comments.html",
        "index.html",
        "group.html",
        "follow.html",
        "profile.html",
        "post.html",
        "new_post.html",
        "post_edit.html",
        "signup.html",
        "login.html",
        "about/author.html",
        "about/tech.html",
        "misc/404.html",
        "misc/500.html",
        "admin/index.html",
        "admin/changelist.html",
        "admin/group_form.html",
    ])?;
    Ok(tera)
}
