use anyhow::Result;
use chrono::Local;
use clap::Subcommand;

use crate::{
    storage::{
        aggregate_storage::AggregateStorage,
        entities::{TagId, TaskEntity},
        task_storage::TaskStorage,
    },
    tasks::{NewTask, TaskService},
};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    #[command(about = "Create a task. Its tags count towards today")]
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, help = "Estimated effort in minutes")]
        duration: Option<u32>,
        #[arg(long = "tag", help = "Tag id, can be repeated. See `streakboard tags`")]
        tags: Vec<String>,
    },
    #[command(about = "Delete a task. Its tags are taken back from today")]
    Delete { id: String },
    #[command(about = "List tasks of a user")]
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        project: Option<String>,
    },
    #[command(about = "Replace the tags of a task")]
    Tags {
        id: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    #[command(about = "Mark a task as done")]
    Done {
        id: String,
        #[arg(long, help = "Mark the task as not done instead")]
        undo: bool,
    },
}

fn to_tag_ids(tags: Vec<String>) -> Vec<TagId> {
    tags.into_iter().map(TagId::from).collect()
}

fn format_task(task: &TaskEntity) -> String {
    let tags = task.tags.iter().map(|v| &**v).collect::<Vec<_>>().join(",");
    format!(
        "{}\t{}\t{}\t{}\t{}",
        task.id,
        task.created_at.with_timezone(&Local).format("%x %H:%M"),
        if task.completed { "done" } else { "open" },
        task.title,
        tags
    )
}

pub async fn process_task_command<A, T>(
    command: TaskCommand,
    service: &TaskService<A, T>,
) -> Result<()>
where
    A: AggregateStorage + Sync,
    T: TaskStorage + Sync,
{
    match command {
        TaskCommand::Add {
            user,
            title,
            description,
            project,
            duration,
            tags,
        } => {
            let task = service
                .create_task(NewTask {
                    user_id: user.into(),
                    title: title.into(),
                    description: description.map(Into::into),
                    project_id: project.map(Into::into),
                    duration,
                    tags: to_tag_ids(tags),
                })
                .await?;
            println!("{}", task.id);
        }
        TaskCommand::Delete { id } => {
            let task = service.delete_task(&id).await?;
            println!("Deleted {}", task.title);
        }
        TaskCommand::List { user, project } => {
            let tasks = match project {
                Some(project) => service.list_tasks_by_project(&user, &project).await?,
                None => service.list_tasks(&user).await?,
            };
            for task in &tasks {
                println!("{}", format_task(task));
            }
        }
        TaskCommand::Tags { id, tags } => {
            let task = service.update_task_tags(&id, to_tag_ids(tags)).await?;
            println!("{}", format_task(&task));
        }
        TaskCommand::Done { id, undo } => {
            let task = service.set_completed(&id, !undo).await?;
            println!("{}", format_task(&task));
        }
    }
    Ok(())
}
